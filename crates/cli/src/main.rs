use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use emotion_relay_core::classification::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use emotion_relay_core::config::ServiceConfig;
use emotion_relay_core::detection::infrastructure::onnx_face_locator::OnnxFaceLocator;
use emotion_relay_core::ingestion::infrastructure::capture_frame_source::CaptureFrameSource;
use emotion_relay_core::ingestion::infrastructure::capture_loop::{CaptureHandle, CaptureLoop};
use emotion_relay_core::ingestion::infrastructure::ffmpeg_capture_device::FfmpegCaptureDevice;
use emotion_relay_core::pipeline::emotion_pipeline::EmotionPipeline;
use emotion_relay_core::pipeline::inference_scheduler::InferenceScheduler;
use emotion_relay_core::pipeline::pipeline_logger::LogPipelineLogger;
use emotion_relay_core::query::query_service::QueryService;
use emotion_relay_core::shared::constants::{FACE_MODEL_NAME, FACE_MODEL_URL};
use emotion_relay_core::shared::model_resolver;
use emotion_relay_core::state::broadcaster::Broadcaster;
use emotion_relay_core::state::emotion_state_store::EmotionStateStore;
use emotion_relay_server::{start_server, AppState};

/// Facial emotion relay: camera or pushed frames in, readings out over HTTP
/// and WebSocket.
#[derive(Parser)]
#[command(name = "emotion-relay")]
struct Cli {
    /// JSON config file (default: per-user config dir, if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Classify every Nth frame (1 = every frame).
    #[arg(long)]
    skip_interval: Option<usize>,

    /// Camera device index.
    #[arg(long)]
    device: Option<u32>,

    /// Do not open the local camera; accept pushed frames only.
    #[arg(long)]
    no_capture: bool,

    /// Address for the HTTP and WebSocket server.
    #[arg(long)]
    bind: Option<String>,

    /// Face detection model (default: cached download).
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// Emotion classification model. Without one the service answers
    /// "unavailable".
    #[arg(long)]
    emotion_model: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|e| format!("Invalid bind address {}: {e}", config.bind_address))?;

    let store = Arc::new(EmotionStateStore::new());
    let broadcaster = Arc::new(Broadcaster::new(store.clone(), config.subscriber_queue));

    let pipeline = match build_scheduler(&config) {
        Ok(scheduler) => Some(Arc::new(EmotionPipeline::new(
            scheduler,
            store.clone(),
            broadcaster.clone(),
        ))),
        Err(e) => {
            log::warn!("Emotion detection unavailable: {e}");
            None
        }
    };

    let capture = match (&pipeline, cli.no_capture) {
        (Some(pipeline), false) => start_capture(&config, pipeline.clone()),
        _ => None,
    };

    let state = match pipeline {
        Some(pipeline) => AppState::new(pipeline),
        None => AppState::unavailable(QueryService::new(store, false), broadcaster),
    };

    let runtime = tokio::runtime::Runtime::new()?;
    let served = runtime.block_on(start_server(addr, state, shutdown_signal()));

    if let Some(capture) = capture {
        if let Some(stats) = capture.shutdown() {
            log::info!("Capture processed {} frames", stats.frames);
        }
    }
    served?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(n) = cli.skip_interval {
        config.skip_interval = n;
    }
    if let Some(index) = cli.device {
        config.capture.device_index = index;
    }
    if let Some(bind) = &cli.bind {
        config.bind_address = bind.clone();
    }
    if let Some(path) = &cli.face_model {
        config.face_model = Some(path.clone());
    }
    if let Some(path) = &cli.emotion_model {
        config.emotion_model = Some(path.clone());
    }
    config.validate()?;
    Ok(config)
}

fn build_scheduler(config: &ServiceConfig) -> Result<InferenceScheduler, Box<dyn std::error::Error>> {
    let emotion_model = config
        .emotion_model
        .as_ref()
        .ok_or("no emotion model configured")?;

    let face_model = match &config.face_model {
        Some(path) => path.clone(),
        None => {
            log::info!("Resolving model: {FACE_MODEL_NAME}");
            let path = model_resolver::resolve(
                FACE_MODEL_NAME,
                FACE_MODEL_URL,
                None,
                Some(Box::new(download_progress)),
            )?;
            eprintln!();
            path
        }
    };

    let locator = OnnxFaceLocator::new(&face_model, config.face_confidence)?;
    let classifier = OnnxEmotionClassifier::new(emotion_model)?;
    log::info!(
        "Emotion detection ready (skip interval {})",
        config.skip_interval
    );

    Ok(InferenceScheduler::new(
        Box::new(locator),
        Box::new(classifier),
        config.skip_interval,
    )?
    .with_logger(Box::new(LogPipelineLogger::default())))
}

/// Opens the camera and starts the capture thread. A missing camera is not
/// fatal: pushed frames still work.
fn start_capture(config: &ServiceConfig, pipeline: Arc<EmotionPipeline>) -> Option<CaptureHandle> {
    let device = match FfmpegCaptureDevice::open(&config.capture) {
        Ok(device) => device,
        Err(e) => {
            log::warn!("Camera unavailable, continuing without local capture: {e}");
            return None;
        }
    };
    let source = CaptureFrameSource::new(Box::new(device));
    match CaptureLoop::from_config(&config.capture).spawn(Box::new(source), pipeline) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::error!("Failed to start capture thread: {e}");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
