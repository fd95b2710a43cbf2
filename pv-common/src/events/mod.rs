//! Wire protocol for the session WebSocket
//!
//! Clients send [`ClientRequest`] objects. The server replies with
//! [`ServerMessage`] values, which serialize to one of these JSON shapes:
//! - `{"status": "..."}` lifecycle acknowledgements
//! - `{"type": "frame" | "audio" | "report", ...}` session events
//! - `{"error": "..."}` rejected requests and per-frame failures

mod session_types;

pub use session_types::{FramePayload, Occurrence, ReportSummary};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Reply text for a request that is not valid JSON or has the wrong shape
pub const INVALID_REQUEST_FORMAT: &str = "Invalid request format";

/// Actions a client may request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    Connect,
    Start,
    Stop,
    Disconnect,
}

impl ClientAction {
    /// Parse the `action` field; `None` for unknown actions
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connect" => Some(Self::Connect),
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "disconnect" => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Spoken feedback language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ur,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ur => "ur",
        }
    }
}

/// Spoken feedback toggle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBot {
    On,
    #[default]
    Off,
}

impl AudioBot {
    pub fn is_on(&self) -> bool {
        matches!(self, AudioBot::On)
    }
}

/// Client → server request
///
/// `action` stays a string so an unknown action can be reported by name
/// instead of as a format error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,

    #[serde(default)]
    pub language: Language,

    #[serde(default)]
    pub audiobot: AudioBot,
}

impl ClientRequest {
    /// Parse a request from a text frame
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for malformed JSON, missing `action`, or
    /// unrecognized `language`/`audiobot` values.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", INVALID_REQUEST_FORMAT, e)))
    }

    pub fn parsed_action(&self) -> Option<ClientAction> {
        ClientAction::from_name(&self.action)
    }
}

/// Lifecycle status values reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Connected,
    Started,
    Stopping,
    Stopped,
    AlreadyRunning,
    NotRunning,
    Disconnected,
}

/// `{"status": ...}` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: SessionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
}

/// `{"type": ...}` session events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Per-frame analysis result with the annotated image
    Frame(FramePayload),

    /// Synthesized speech for the current feedback text (base64)
    Audio { audio_data: String },

    /// End-of-session report
    Report {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<ReportSummary>,
    },
}

/// `{"error": ...}` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

/// Server → client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Status(StatusMessage),
    Event(SessionEvent),
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn status(status: SessionStatus) -> Self {
        ServerMessage::Status(StatusMessage {
            status,
            exercise: None,
        })
    }

    /// `started` acknowledgement naming the exercise
    pub fn started(exercise: &str) -> Self {
        ServerMessage::Status(StatusMessage {
            status: SessionStatus::Started,
            exercise: Some(exercise.to_string()),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            error: message.into(),
        })
    }

    pub fn frame(payload: FramePayload) -> Self {
        ServerMessage::Event(SessionEvent::Frame(payload))
    }

    pub fn audio(audio_data: String) -> Self {
        ServerMessage::Event(SessionEvent::Audio { audio_data })
    }

    pub fn report(text: String, summary: Option<ReportSummary>) -> Self {
        ServerMessage::Event(SessionEvent::Report {
            data: text,
            summary,
        })
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Status(_) => "status",
            ServerMessage::Event(SessionEvent::Frame(_)) => "frame",
            ServerMessage::Event(SessionEvent::Audio { .. }) => "audio",
            ServerMessage::Event(SessionEvent::Report { .. }) => "report",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn status_value(&self) -> Option<SessionStatus> {
        match self {
            ServerMessage::Status(s) => Some(s.status),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize {}: {}", self.kind(), e)))
    }
}
