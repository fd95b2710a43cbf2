//! # PhysioVision Session Engine (pv-vision)
//!
//! Real-time exercise-form feedback over a live pose stream.
//!
//! **Purpose:** Turn per-frame skeletal landmarks into form errors, rep counts
//! and spoken cues for one exercise session at a time, and stream the results
//! to every connected viewer over WebSocket.
//!
//! **Architecture:** frame source → landmark provider → exercise analyzer →
//! session controller → broadcast hub → clients. The feedback throttler taps
//! the analyzer's feedback text and sends speech back through the hub.

pub mod analysis;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod feedback;
pub mod geometry;
pub mod hub;
pub mod landmarks;
pub mod report;
pub mod session;

pub use error::{Error, Result};
