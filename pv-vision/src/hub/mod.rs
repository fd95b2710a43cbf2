//! Broadcast hub for session viewers
//!
//! Producers (frame pump, session controller, speech tasks) hold a
//! [`HubSender`] and push [`Outbound`] messages into one channel. A single
//! dispatcher task drains that channel into the [`BroadcastHub`], which fans
//! each message out to the per-client queues drained by the WebSocket tasks.

pub mod broadcaster;
pub mod sender;

pub use broadcaster::{BroadcastHub, ClientId};
pub use sender::{spawn_dispatcher, HubSender};

use pv_common::ServerMessage;

/// Item on the result channel, applied in order
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Deliver to every registered client
    All(ServerMessage),
    /// Deliver only to the requesting client
    To(ClientId, ServerMessage),
    /// Remove a client once everything queued before this has been routed
    Unregister(ClientId),
}
