//! Per-session state shared by the pump and the controller

use crate::analysis::{Analyzer, ExerciseAnalyzer, ExerciseKind};
use crate::collaborators::ReportSink;
use crate::feedback::SpokenFeedback;
use crate::hub::HubSender;
use crate::report::SessionReport;
use chrono::{DateTime, Utc};
use pv_common::{ServerMessage, SessionStatus};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything one session mutates
///
/// The pump locks this once per frame. The controller locks it only to emit
/// the report when the pump did not.
pub struct SessionContext {
    pub id: Uuid,
    pub exercise: ExerciseKind,
    pub started_at: DateTime<Utc>,
    pub analyzer: ExerciseAnalyzer,
    pub feedback: Option<SpokenFeedback>,
    /// Frames processed so far
    pub sequence: u64,
    report_emitted: bool,
}

impl SessionContext {
    pub fn new(
        id: Uuid,
        exercise: ExerciseKind,
        analyzer: ExerciseAnalyzer,
        feedback: Option<SpokenFeedback>,
    ) -> Self {
        Self {
            id,
            exercise,
            started_at: Utc::now(),
            analyzer,
            feedback,
            sequence: 0,
            report_emitted: false,
        }
    }

    /// The session report, the first time only
    pub fn take_report(&mut self) -> Option<SessionReport> {
        if self.report_emitted {
            return None;
        }
        self.report_emitted = true;
        Some(self.analyzer.report())
    }
}

/// Emit the report and `stopped` unless this session already did
///
/// Returns true when this call emitted them. A sink failure is logged and
/// does not prevent the broadcast.
pub async fn finish_session(
    context: &Mutex<SessionContext>,
    hub: &HubSender,
    sink: &dyn ReportSink,
) -> bool {
    let (report, id, sequence, speech) = {
        let mut ctx = context.lock().await;
        let speech = ctx
            .feedback
            .as_mut()
            .map(SpokenFeedback::cancel)
            .unwrap_or_default();
        (ctx.take_report(), ctx.id, ctx.sequence, speech)
    };
    // Aborted speech tasks must be gone before `stopped` goes out
    for task in speech {
        let _ = task.await;
    }
    let Some(report) = report else {
        return false;
    };

    match sink.store(&report) {
        Ok(Some(path)) => info!("Session {} report stored at {}", id, path.display()),
        Ok(None) => {}
        Err(e) => warn!("Failed to store report for session {}: {}", id, e),
    }

    info!(
        "Session {} finished after {} frames: {} recorded, {:.1}% good form",
        id, sequence, report.summary.recorded_frames, report.summary.good_form_percent
    );

    hub.broadcast(ServerMessage::report(report.text, Some(report.summary)))
        .await;
    hub.broadcast(ServerMessage::status(SessionStatus::Stopped)).await;
    true
}
