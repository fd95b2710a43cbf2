//! PhysioVision session service (pv-vision) - Main entry point
//!
//! Serves the session WebSocket and drives one exercise session at a time
//! from the configured capture source.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pv_common::config::resolve_config_path;
use pv_vision::analysis::RuleBasedSquatClassifier;
use pv_vision::api::{self, AppContext};
use pv_vision::collaborators::{
    FileReportSink, HttpSpeechSynthesizer, NullReportSink, RecordedLandmarks, ReplayVideoOpener,
    ReportSink, SpeechSynthesizer, UnavailableVideoOpener, VideoOpener,
};
use pv_vision::config::VisionConfig;
use pv_vision::hub::{spawn_dispatcher, BroadcastHub};
use pv_vision::session::{SessionController, SessionDeps, SessionSettings};

/// Command-line arguments for pv-vision
#[derive(Parser, Debug)]
#[command(name = "pv-vision")]
#[command(about = "Exercise form feedback session service")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PV_VISION_PORT")]
    port: Option<u16>,

    /// Configuration file (default: ~/.config/physiovision/pv-vision.toml)
    #[arg(short, long, env = "PV_VISION_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-lines pose recording to replay as the capture source
    #[arg(short, long, env = "PV_VISION_REPLAY")]
    replay: Option<PathBuf>,

    /// Speech synthesis endpoint for spoken feedback
    #[arg(long, env = "PV_SPEECH_ENDPOINT")]
    speech_endpoint: Option<String>,

    /// Directory for session report files
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), "pv-vision");
    let mut config = VisionConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG overrides the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "pv_vision={},pv_common=info,tower_http=info",
                    config.logging.level.to_ascii_lowercase()
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    // Command-line values win over the file
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.replay.is_some() {
        config.video.replay_path = args.replay;
    }
    if args.speech_endpoint.is_some() {
        config.speech.endpoint = args.speech_endpoint;
    }
    if args.report_dir.is_some() {
        config.reports.directory = args.report_dir;
    }

    info!(
        "Starting PhysioVision session service on {}:{}",
        config.server.bind, config.server.port
    );

    let video: Arc<dyn VideoOpener> = match &config.video.replay_path {
        Some(path) => {
            info!("Capture source: replay {}", path.display());
            Arc::new(ReplayVideoOpener::new(path))
        }
        None => {
            warn!("No capture source configured; sessions will end immediately");
            Arc::new(UnavailableVideoOpener)
        }
    };

    let speech: Option<Arc<dyn SpeechSynthesizer>> = match &config.speech.endpoint {
        Some(endpoint) => {
            info!("Speech synthesis via {}", endpoint);
            Some(Arc::new(
                HttpSpeechSynthesizer::new(endpoint.clone(), config.speech.timeout())
                    .context("Failed to create speech client")?,
            ))
        }
        None => {
            info!("No speech endpoint configured; spoken feedback disabled");
            None
        }
    };

    let reports: Arc<dyn ReportSink> = match &config.reports.directory {
        Some(dir) => {
            info!("Reports will be written to {}", dir.display());
            Arc::new(FileReportSink::new(dir))
        }
        None => Arc::new(NullReportSink),
    };

    let hub = Arc::new(BroadcastHub::new(config.session.client_queue_capacity));
    let (sender, dispatcher) =
        spawn_dispatcher(Arc::clone(&hub), config.session.hub_channel_capacity);

    let controller = Arc::new(SessionController::new(
        SessionSettings::from(&config),
        SessionDeps {
            video,
            landmarks: Arc::new(RecordedLandmarks),
            speech,
            reports,
            classifier: Arc::new(RuleBasedSquatClassifier::default()),
        },
        sender.clone(),
    ));

    let ctx = AppContext {
        controller: Arc::clone(&controller),
        hub,
        sender,
    };

    api::run(&config.server.bind, config.server.port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    // An active session ends through the normal stop path so its report goes out
    controller.shutdown().await;
    drop(controller);
    dispatcher.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
