//! Producer side of the result channel

use super::{BroadcastHub, ClientId, Outbound};
use pv_common::ServerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cloneable handle for pushing messages toward the hub
#[derive(Clone)]
pub struct HubSender {
    tx: mpsc::Sender<Outbound>,
}

impl HubSender {
    /// Queue a message for every client, waiting for channel space
    pub async fn broadcast(&self, message: ServerMessage) {
        self.send(Outbound::All(message)).await;
    }

    /// Queue a reply for one client, waiting for channel space
    pub async fn send_to(&self, client: ClientId, message: ServerMessage) {
        self.send(Outbound::To(client, message)).await;
    }

    /// Remove a client after the messages already queued for it
    pub async fn unregister(&self, client: ClientId) {
        self.send(Outbound::Unregister(client)).await;
    }

    /// Queue a message for every client without waiting
    ///
    /// Returns false when the message was dropped because the channel is full
    /// or the dispatcher has stopped. Used for frames, which must never stall
    /// the pump.
    pub fn try_broadcast(&self, message: ServerMessage) -> bool {
        match self.tx.try_send(Outbound::All(message)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                debug!("Result channel full, dropping {} message", kind(&dropped));
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    async fn send(&self, outbound: Outbound) {
        if let Err(e) = self.tx.send(outbound).await {
            warn!("Hub dispatcher stopped, {} message lost", kind(&e.0));
        }
    }
}

fn kind(outbound: &Outbound) -> &'static str {
    match outbound {
        Outbound::All(m) | Outbound::To(_, m) => m.kind(),
        Outbound::Unregister(_) => "unregister",
    }
}

/// Spawn the dispatcher task that drains the result channel into `hub`
///
/// The task ends once every [`HubSender`] has been dropped.
pub fn spawn_dispatcher(hub: Arc<BroadcastHub>, capacity: usize) -> (HubSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(async move {
        info!("Hub dispatcher started");
        while let Some(outbound) = rx.recv().await {
            hub.dispatch(outbound).await;
        }
        info!("Hub dispatcher stopped");
    });
    (HubSender { tx }, handle)
}
