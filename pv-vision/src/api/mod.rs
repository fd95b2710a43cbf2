//! HTTP and WebSocket API
//!
//! - `GET /` and `GET /ws`: session WebSocket
//! - `GET /health`: liveness, client count and session state

pub mod handlers;
pub mod server;
pub mod ws;

pub use server::{build_router, run, AppContext};
