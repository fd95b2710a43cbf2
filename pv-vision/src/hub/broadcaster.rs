//! Client registry with failure-isolated fan-out

use crate::error::{Error, Result};
use pv_common::ServerMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Outbound;

/// Opaque handle for a connected viewer
pub type ClientId = Uuid;

/// Registered viewers and their outbound queues
///
/// Each client gets a bounded queue of serialized messages. A send fails when
/// the queue is closed (the connection task went away) or full (the client is
/// not keeping up); either way only that client is dropped.
pub struct BroadcastHub {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<Arc<str>>>>,
    queue_capacity: usize,
}

impl BroadcastHub {
    /// Create a hub
    ///
    /// # Arguments
    ///
    /// * `queue_capacity` - Per-client outbound queue length
    pub fn new(queue_capacity: usize) -> Self {
        info!("Broadcast hub initialized with client queue capacity {}", queue_capacity);
        Self {
            clients: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a client; the receiver is drained by its connection task
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<Arc<str>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let mut clients = self.clients.write().await;
        clients.insert(id, tx);
        info!("Client {} registered, total clients: {}", id, clients.len());
        (id, rx)
    }

    /// Remove a client; returns false if it was already gone
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(&id).is_some();
        if removed {
            info!("Client {} unregistered, total clients: {}", id, clients.len());
        }
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Deliver to every client present at call time
    ///
    /// Returns the number of clients that accepted the message. Clients whose
    /// queue rejected it are removed before returning.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let text: Arc<str> = match message.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                error!("Dropping {} message: {}", message.kind(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        {
            let clients = self.clients.read().await;
            for (id, tx) in clients.iter() {
                match tx.try_send(Arc::clone(&text)) {
                    Ok(()) => delivered += 1,
                    Err(e) => failed.push((*id, describe(&e))),
                }
            }
        }

        if !failed.is_empty() {
            self.prune(&failed).await;
        }

        debug!("Broadcast {} to {} clients", message.kind(), delivered);
        delivered
    }

    /// Deliver to one client
    ///
    /// # Errors
    ///
    /// `ClientSendFailure` if the client is unknown or its queue rejected the
    /// message; a rejecting client is removed.
    pub async fn send_to(&self, id: ClientId, message: &ServerMessage) -> Result<()> {
        let json = message.to_json()?;
        let outcome = {
            let clients = self.clients.read().await;
            match clients.get(&id) {
                Some(tx) => tx.try_send(json.into()).map_err(|e| describe(&e)),
                None => return Err(Error::ClientSendFailure(id.to_string())),
            }
        };

        if let Err(reason) = outcome {
            self.prune(&[(id, reason)]).await;
            return Err(Error::ClientSendFailure(id.to_string()));
        }
        Ok(())
    }

    /// Route one message from the result channel
    pub async fn dispatch(&self, outbound: Outbound) {
        match outbound {
            Outbound::All(message) => {
                self.broadcast(&message).await;
            }
            Outbound::To(id, message) => {
                if let Err(e) = self.send_to(id, &message).await {
                    debug!("{} reply not delivered: {}", message.kind(), e);
                }
            }
            Outbound::Unregister(id) => {
                self.unregister(id).await;
            }
        }
    }

    async fn prune(&self, failed: &[(ClientId, &'static str)]) {
        let mut clients = self.clients.write().await;
        for (id, reason) in failed {
            if clients.remove(id).is_some() {
                warn!("Dropped client {} ({}), remaining clients: {}", id, reason, clients.len());
            }
        }
    }
}

fn describe<T>(e: &TrySendError<T>) -> &'static str {
    match e {
        TrySendError::Full(_) => "queue full",
        TrySendError::Closed(_) => "connection closed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pv_common::SessionStatus;

    fn stopped() -> ServerMessage {
        ServerMessage::status(SessionStatus::Stopped)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let hub = BroadcastHub::new(8);
        let (_a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;

        assert_eq!(hub.broadcast(&stopped()).await, 2);
        assert_eq!(&*rx_a.recv().await.unwrap(), r#"{"status":"stopped"}"#);
        assert_eq!(&*rx_b.recv().await.unwrap(), r#"{"status":"stopped"}"#);
    }

    #[tokio::test]
    async fn closed_client_is_pruned_without_affecting_others() {
        let hub = BroadcastHub::new(8);
        let (_gone, rx_gone) = hub.register().await;
        let (_alive, mut rx_alive) = hub.register().await;
        drop(rx_gone);

        assert_eq!(hub.broadcast(&stopped()).await, 1);
        assert_eq!(hub.client_count().await, 1);
        assert!(rx_alive.recv().await.is_some());
    }

    #[tokio::test]
    async fn slow_client_is_dropped_when_queue_fills() {
        let hub = BroadcastHub::new(1);
        let (_slow, _rx_slow) = hub.register().await;

        assert_eq!(hub.broadcast(&stopped()).await, 1);
        assert_eq!(hub.broadcast(&stopped()).await, 0);
        assert_eq!(hub.client_count().await, 0);
    }

    #[tokio::test]
    async fn send_to_targets_one_client() {
        let hub = BroadcastHub::new(8);
        let (a, mut rx_a) = hub.register().await;
        let (_b, mut rx_b) = hub.register().await;

        hub.dispatch(Outbound::To(a, ServerMessage::status(SessionStatus::Connected)))
            .await;
        assert_eq!(&*rx_a.recv().await.unwrap(), r#"{"status":"connected"}"#);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_client_fails() {
        let hub = BroadcastHub::new(8);
        let err = hub.send_to(Uuid::new_v4(), &stopped()).await.unwrap_err();
        assert!(matches!(err, Error::ClientSendFailure(_)));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = BroadcastHub::new(8);
        let (id, _rx) = hub.register().await;
        assert!(hub.unregister(id).await);
        assert!(!hub.unregister(id).await);
        assert_eq!(hub.client_count().await, 0);
    }
}
