//! Session lifecycle and client request handling

use super::context::{finish_session, SessionContext};
use super::pump::FramePump;
use super::{SessionDeps, SessionSettings, SessionState};
use crate::analysis::{Analyzer, ExerciseAnalyzer, ExerciseKind};
use crate::error::{Error, Result};
use crate::feedback::{FeedbackThrottler, SpokenFeedback};
use crate::hub::{ClientId, HubSender};
use pv_common::events::{ClientAction, ClientRequest, Language, INVALID_REQUEST_FORMAT};
use pv_common::{ServerMessage, SessionStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options carried by a `start` request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    pub language: Language,
    /// Speak throttled feedback (requires a configured synthesizer)
    pub spoken_feedback: bool,
}

/// What the connection should do after a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepOpen,
    Close,
}

pub(crate) struct ActiveSession {
    pub id: Uuid,
    pub exercise: ExerciseKind,
    pub stop_flag: Arc<AtomicBool>,
    pub handle: JoinHandle<()>,
    pub context: Arc<Mutex<SessionContext>>,
}

pub(crate) struct ControllerState {
    pub state: SessionState,
    pub active: Option<ActiveSession>,
}

/// Owns the single active session
pub struct SessionController {
    state: Arc<Mutex<ControllerState>>,
    deps: SessionDeps,
    settings: SessionSettings,
    hub: HubSender,
}

impl SessionController {
    pub fn new(settings: SessionSettings, deps: SessionDeps, hub: HubSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(ControllerState {
                state: SessionState::Idle,
                active: None,
            })),
            deps,
            settings,
            hub,
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.lock().await.state
    }

    pub async fn active_exercise(&self) -> Option<ExerciseKind> {
        self.state.lock().await.active.as_ref().map(|a| a.exercise)
    }

    /// Start a session for `exercise`
    ///
    /// Broadcasts `started` before the first frame.
    ///
    /// # Errors
    ///
    /// `InvalidExercise` for an unknown name; `SessionAlreadyRunning` unless
    /// the controller is idle. Neither touches an active session.
    pub async fn start(&self, exercise: &str, options: StartOptions) -> Result<ExerciseKind> {
        let kind = ExerciseKind::from_name(exercise)?;

        let mut state = self.state.lock().await;
        if state.state != SessionState::Idle {
            return Err(Error::SessionAlreadyRunning);
        }

        let mut analyzer = ExerciseAnalyzer::new(
            kind,
            &self.settings.exercises,
            self.settings.session.fps,
            Arc::clone(&self.deps.classifier),
        );
        analyzer.reset();

        let id = Uuid::new_v4();
        let context = Arc::new(Mutex::new(SessionContext::new(
            id,
            kind,
            analyzer,
            self.spoken_feedback(options),
        )));
        let stop_flag = Arc::new(AtomicBool::new(false));

        self.hub.broadcast(ServerMessage::started(kind.wire_name())).await;

        let handle = FramePump {
            id,
            context: Arc::clone(&context),
            stop_flag: Arc::clone(&stop_flag),
            controller: Arc::clone(&self.state),
            deps: self.deps.clone(),
            hub: self.hub.clone(),
            period: self.settings.session.frame_period(),
        }
        .start();

        state.active = Some(ActiveSession {
            id,
            exercise: kind,
            stop_flag,
            handle,
            context,
        });
        state.state = SessionState::Running;
        info!(
            "Session {} started: {} (language {}, spoken feedback {})",
            id,
            kind,
            options.language.code(),
            options.spoken_feedback
        );
        Ok(kind)
    }

    fn spoken_feedback(&self, options: StartOptions) -> Option<SpokenFeedback> {
        if !options.spoken_feedback {
            return None;
        }
        let Some(synthesizer) = self.deps.speech.as_ref() else {
            warn!("Spoken feedback requested but no speech synthesizer is configured");
            return None;
        };
        let speech = &self.settings.speech;
        Some(SpokenFeedback::new(
            FeedbackThrottler::new(
                Duration::from_millis(speech.hold_ms),
                Duration::from_millis(speech.repeat_ms),
            ),
            Arc::clone(synthesizer),
            options.language,
            speech.timeout(),
            self.hub.clone(),
        ))
    }

    /// Stop the running session
    ///
    /// Waits up to the stop timeout for the pump to exit, then aborts it.
    /// Either way the session's report is broadcast exactly once before the
    /// controller returns to `Idle`.
    ///
    /// # Errors
    ///
    /// `SessionNotRunning` unless a session is running.
    pub async fn stop(&self) -> Result<()> {
        let mut active = {
            let mut state = self.state.lock().await;
            if state.state != SessionState::Running {
                return Err(Error::SessionNotRunning);
            }
            let Some(active) = state.active.take() else {
                return Err(Error::SessionNotRunning);
            };
            state.state = SessionState::Stopping;
            active
        };

        info!("Stopping session {}", active.id);
        active.stop_flag.store(true, Ordering::Relaxed);
        self.hub.broadcast(ServerMessage::status(SessionStatus::Stopping)).await;

        let timeout = self.settings.session.stop_timeout();
        match tokio::time::timeout(timeout, &mut active.handle).await {
            Ok(Ok(())) => debug!("Frame pump for session {} joined", active.id),
            Ok(Err(e)) => warn!("Frame pump for session {} failed: {}", active.id, e),
            Err(_) => {
                warn!(
                    "Frame pump for session {} did not stop within {:?}, aborting",
                    active.id, timeout
                );
                active.handle.abort();
                if tokio::time::timeout(timeout, &mut active.handle).await.is_err() {
                    warn!("Frame pump for session {} still unwinding after abort", active.id);
                }
            }
        }

        finish_session(&active.context, &self.hub, self.deps.reports.as_ref()).await;

        self.state.lock().await.state = SessionState::Idle;
        info!("Session {} stopped", active.id);
        Ok(())
    }

    /// Stop any running session; used on process shutdown
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(()) | Err(Error::SessionNotRunning) => {}
            Err(e) => warn!("Error stopping session during shutdown: {}", e),
        }
    }

    /// Handle one text frame from `client`
    ///
    /// Replies that concern only the requester go to that client; lifecycle
    /// changes are broadcast.
    pub async fn handle_request(&self, client: ClientId, text: &str) -> Disposition {
        let request = match ClientRequest::parse(text) {
            Ok(request) => request,
            Err(e) => {
                warn!("Client {}: {}", client, e);
                self.reply(client, ServerMessage::error(INVALID_REQUEST_FORMAT)).await;
                return Disposition::KeepOpen;
            }
        };
        debug!(
            "Client {} requested {} (exercise {:?})",
            client, request.action, request.exercise
        );

        let Some(action) = request.parsed_action() else {
            warn!("Client {} sent unknown action {}", client, request.action);
            self.reply(
                client,
                ServerMessage::error(format!("Unknown action: {}", request.action)),
            )
            .await;
            return Disposition::KeepOpen;
        };

        match action {
            ClientAction::Connect => {
                self.reply(client, ServerMessage::status(SessionStatus::Connected)).await;
            }
            ClientAction::Start => {
                let options = StartOptions {
                    language: request.language,
                    spoken_feedback: request.audiobot.is_on(),
                };
                let exercise = request.exercise.as_deref().unwrap_or_default();
                match self.start(exercise, options).await {
                    Ok(_) => {}
                    Err(Error::SessionAlreadyRunning) => {
                        self.reply(client, ServerMessage::status(SessionStatus::AlreadyRunning))
                            .await;
                    }
                    Err(e) => self.reply(client, ServerMessage::error(e.to_string())).await,
                }
            }
            ClientAction::Stop => match self.stop().await {
                Ok(()) => {}
                Err(Error::SessionNotRunning) => {
                    self.reply(client, ServerMessage::status(SessionStatus::NotRunning))
                        .await;
                }
                Err(e) => self.reply(client, ServerMessage::error(e.to_string())).await,
            },
            ClientAction::Disconnect => {
                self.reply(client, ServerMessage::status(SessionStatus::Disconnected))
                    .await;
                return Disposition::Close;
            }
        }
        Disposition::KeepOpen
    }

    async fn reply(&self, client: ClientId, message: ServerMessage) {
        self.hub.send_to(client, message).await;
    }
}
