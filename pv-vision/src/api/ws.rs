//! Session WebSocket
//!
//! Each connection registers with the hub and splits into a writer task,
//! which drains the client's outbound queue into the socket, and a reader
//! loop, which hands text frames to the session controller in arrival order.

use crate::api::server::AppContext;
use crate::session::Disposition;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use pv_common::events::INVALID_REQUEST_FORMAT;
use pv_common::ServerMessage;
use std::time::Duration;
use tracing::{debug, info};

/// How long a closing connection may take to flush queued messages
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// GET / and GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext) {
    let (client, mut outbound) = ctx.hub.register().await;
    let (mut sink, mut stream) = socket.split();
    info!("WebSocket client {} connected", client);

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let writer_done = loop {
        tokio::select! {
            _ = &mut writer => break true,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if ctx.controller.handle_request(client, &text).await == Disposition::Close {
                        break false;
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    ctx.sender
                        .send_to(client, ServerMessage::error(INVALID_REQUEST_FORMAT))
                        .await;
                }
                Some(Ok(Message::Close(_))) | None => break false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket client {} receive error: {}", client, e);
                    break false;
                }
            },
        }
    };

    ctx.sender.unregister(client).await;
    if !writer_done && tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    info!("WebSocket client {} disconnected", client);
}
