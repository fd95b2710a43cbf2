//! External collaborators
//!
//! The session engine reaches capture, pose extraction, speech synthesis and
//! report persistence only through the traits here. Shipped implementations:
//!
//! | Trait | Implementation |
//! |-------|----------------|
//! | [`VideoOpener`] | [`ReplayVideoOpener`], [`UnavailableVideoOpener`] |
//! | [`LandmarkProvider`] | [`RecordedLandmarks`] |
//! | [`SpeechSynthesizer`] | [`HttpSpeechSynthesizer`] |
//! | [`ReportSink`] | [`FileReportSink`], [`NullReportSink`] |

pub mod sink;
pub mod speech;
pub mod video;

pub use sink::{FileReportSink, NullReportSink};
pub use speech::HttpSpeechSynthesizer;
pub use video::{ReplayVideoOpener, UnavailableVideoOpener, VideoLease};

use crate::error::Result;
use crate::landmarks::PoseLandmarks;
use crate::report::SessionReport;
use futures::future::BoxFuture;
use pv_common::events::Language;
use std::path::PathBuf;

/// One captured frame
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    /// Position in the stream, starting at 1
    pub sequence: u64,
    /// Opaque image bytes handed to viewers as base64
    pub image: Vec<u8>,
    /// Pose carried by sources that replay recorded landmarks
    pub landmarks: Option<PoseLandmarks>,
}

/// An open capture stream
pub trait VideoSource: Send {
    /// Next frame; `Ok(None)` at end of stream
    ///
    /// # Errors
    ///
    /// `VideoSourceDisconnected` ends the session. Any other error affects
    /// only the frame being read.
    fn read_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Release the underlying device or file
    fn release(&mut self);
}

/// Acquires the capture source at session start
pub trait VideoOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn VideoSource>>;
}

/// Pose extraction for one frame
pub trait LandmarkProvider: Send + Sync {
    /// Landmarks for the frame, or `None` when no person is detected
    fn detect(&self, frame: &VideoFrame) -> Result<Option<PoseLandmarks>>;
}

/// Landmarks already attached to the frame by the source
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedLandmarks;

impl LandmarkProvider for RecordedLandmarks {
    fn detect(&self, frame: &VideoFrame) -> Result<Option<PoseLandmarks>> {
        Ok(frame.landmarks.clone().filter(|pose| !pose.is_empty()))
    }
}

/// Text-to-speech
pub trait SpeechSynthesizer: Send + Sync {
    /// Audio bytes for `text` spoken in `language`
    fn synthesize<'a>(&'a self, text: &'a str, language: Language) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Storage for finished reports
pub trait ReportSink: Send + Sync {
    /// Store the report; returns where it went, if anywhere
    fn store(&self, report: &SessionReport) -> Result<Option<PathBuf>>;
}
