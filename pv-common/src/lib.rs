//! # PhysioVision Common Library
//!
//! Shared code for PhysioVision services including:
//! - Error type and result alias
//! - Bootstrap configuration loading (TOML with graceful degradation)
//! - Wire protocol types exchanged with session viewers

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{ClientAction, ClientRequest, ServerMessage, SessionStatus};
