//! Spoken feedback
//!
//! [`FeedbackThrottler`] decides when the analyzer's feedback text is worth
//! speaking: the same text must persist for the hold interval before it is
//! spoken once, then it repeats at most every repeat interval while unchanged.
//! Time is passed in, so the throttler is a plain state machine.
//!
//! [`SpokenFeedback`] pairs a throttler with a synthesizer. Each emission runs
//! as a detached task bounded by a timeout and lands on the hub as an `audio`
//! or `error` message.

use crate::collaborators::SpeechSynthesizer;
use crate::error::Error;
use crate::hub::HubSender;
use base64::prelude::*;
use pv_common::events::Language;
use pv_common::ServerMessage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Debounce and rate limit for feedback text
#[derive(Debug, Clone)]
pub struct FeedbackThrottler {
    hold: Duration,
    repeat: Duration,
    held: Option<String>,
    held_since: Option<Instant>,
    last_emitted: Option<Instant>,
}

impl FeedbackThrottler {
    pub fn new(hold: Duration, repeat: Duration) -> Self {
        Self {
            hold,
            repeat,
            held: None,
            held_since: None,
            last_emitted: None,
        }
    }

    /// Feed the current text; returns the text to speak, if any
    pub fn observe(&mut self, text: &str, now: Instant) -> Option<String> {
        if text.is_empty() {
            self.reset();
            return None;
        }

        if self.held.as_deref() != Some(text) {
            self.held = Some(text.to_string());
            self.held_since = Some(now);
            self.last_emitted = None;
            return None;
        }

        let due = match (self.last_emitted, self.held_since) {
            (Some(last), _) => now.saturating_duration_since(last) >= self.repeat,
            (None, Some(since)) => now.saturating_duration_since(since) >= self.hold,
            (None, None) => false,
        };
        if !due {
            return None;
        }

        self.last_emitted = Some(now);
        self.held.clone()
    }

    pub fn reset(&mut self) {
        self.held = None;
        self.held_since = None;
        self.last_emitted = None;
    }
}

/// Throttled speech for one session
pub struct SpokenFeedback {
    throttler: FeedbackThrottler,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    language: Language,
    timeout: Duration,
    hub: HubSender,
    /// Synthesis tasks that may still broadcast
    pending: Vec<JoinHandle<()>>,
}

impl SpokenFeedback {
    pub fn new(
        throttler: FeedbackThrottler,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        language: Language,
        timeout: Duration,
        hub: HubSender,
    ) -> Self {
        Self {
            throttler,
            synthesizer,
            language,
            timeout,
            hub,
            pending: Vec::new(),
        }
    }

    /// Feed the frame's text; spawns a synthesis task when the throttler emits
    ///
    /// Returns true when speech was requested.
    pub fn observe(&mut self, text: &str, now: Instant) -> bool {
        self.pending.retain(|task| !task.is_finished());
        let Some(text) = self.throttler.observe(text, now) else {
            return false;
        };
        info!(language = self.language.code(), "Speaking feedback: {}", text);

        let synthesizer = Arc::clone(&self.synthesizer);
        let language = self.language;
        let timeout = self.timeout;
        let hub = self.hub.clone();
        self.pending.push(tokio::spawn(async move {
            let message = speak(synthesizer.as_ref(), &text, language, timeout).await;
            hub.broadcast(message).await;
        }));
        true
    }

    /// Abort outstanding synthesis and clear the throttler
    ///
    /// The returned tasks have been aborted; awaiting them guarantees none of
    /// them broadcasts afterwards.
    pub fn cancel(&mut self) -> Vec<JoinHandle<()>> {
        self.throttler.reset();
        let pending = std::mem::take(&mut self.pending);
        for task in &pending {
            task.abort();
        }
        if !pending.is_empty() {
            debug!("Cancelled {} speech task(s)", pending.len());
        }
        pending
    }
}

async fn speak(
    synthesizer: &dyn SpeechSynthesizer,
    text: &str,
    language: Language,
    timeout: Duration,
) -> ServerMessage {
    match tokio::time::timeout(timeout, synthesizer.synthesize(text, language)).await {
        Ok(Ok(audio)) => ServerMessage::audio(BASE64_STANDARD.encode(audio)),
        Ok(Err(e)) => {
            let reason = match e {
                Error::Speech(reason) => reason,
                other => other.to_string(),
            };
            warn!("Speech synthesis failed: {}", reason);
            ServerMessage::error(format!("Error generating speech: {}", reason))
        }
        Err(_) => {
            warn!("Speech synthesis timed out after {:?}", timeout);
            ServerMessage::error(format!(
                "Error generating speech: timed out after {} ms",
                timeout.as_millis()
            ))
        }
    }
}
