//! Capture sources
//!
//! [`ReplayVideoOpener`] replays a JSON-lines pose recording, one frame per
//! line:
//!
//! ```text
//! {"image": "<base64>", "landmarks": {"LEFT_HIP": {"x": 0.4, "y": 0.5, "visibility": 0.9}, ...}}
//! {"image": "<base64>", "landmarks": null}
//! ```
//!
//! End of file is end of stream.

use super::{VideoFrame, VideoOpener, VideoSource};
use crate::error::{Error, Result};
use crate::landmarks::PoseLandmarks;
use base64::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Owns an open source for the lifetime of a session
///
/// Dropping the lease releases the source, so every exit from the frame pump
/// (normal end, stop, error, task abort) gives the device back.
pub struct VideoLease {
    source: Box<dyn VideoSource>,
}

impl VideoLease {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self { source }
    }

    pub fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        self.source.read_frame()
    }
}

impl Drop for VideoLease {
    fn drop(&mut self) {
        self.source.release();
        debug!("Video source released");
    }
}

/// Opens a recording on every session start
#[derive(Debug, Clone)]
pub struct ReplayVideoOpener {
    path: PathBuf,
}

impl ReplayVideoOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoOpener for ReplayVideoOpener {
    fn open(&self) -> Result<Box<dyn VideoSource>> {
        let file = File::open(&self.path).map_err(|e| {
            Error::VideoSourceDisconnected(format!("{}: {}", self.path.display(), e))
        })?;
        info!("Opened replay source {}", self.path.display());
        Ok(Box::new(ReplaySource {
            reader: Some(BufReader::new(file)),
            line: String::new(),
            sequence: 0,
        }))
    }
}

/// Opener used when no capture source is configured; every open fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableVideoOpener;

impl VideoOpener for UnavailableVideoOpener {
    fn open(&self) -> Result<Box<dyn VideoSource>> {
        Err(Error::VideoSourceDisconnected(
            "no capture source configured".to_string(),
        ))
    }
}

#[derive(Deserialize)]
struct ReplayLine {
    #[serde(default)]
    image: String,
    #[serde(default)]
    landmarks: Option<PoseLandmarks>,
}

struct ReplaySource {
    reader: Option<BufReader<File>>,
    line: String,
    sequence: u64,
}

impl VideoSource for ReplaySource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        loop {
            self.line.clear();
            let read = reader
                .read_line(&mut self.line)
                .map_err(|e| Error::VideoSourceDisconnected(e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            if !self.line.trim().is_empty() {
                break;
            }
        }

        self.sequence += 1;
        let parsed: ReplayLine = serde_json::from_str(self.line.trim()).map_err(|e| {
            Error::FrameProcessing(format!("replay line {}: {}", self.sequence, e))
        })?;
        let image = BASE64_STANDARD.decode(parsed.image.as_bytes()).map_err(|e| {
            Error::FrameProcessing(format!("replay line {} image: {}", self.sequence, e))
        })?;

        Ok(Some(VideoFrame {
            sequence: self.sequence,
            image,
            landmarks: parsed.landmarks,
        }))
    }

    fn release(&mut self) {
        self.reader = None;
    }
}
