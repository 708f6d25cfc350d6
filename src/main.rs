use anyhow::{Context, Result};
use bench_recorder::{
    create_router, AppState, AudioBackend, AudioBackendFactory, Config, RecorderError,
    StartRequest,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bench-recorder")]
#[command(about = "Synchronized playback and two-channel capture on an audio interface")]
#[command(version)]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/bench-recorder")]
    config: String,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control service
    Serve,

    /// List audio devices
    Devices {
        /// Name fragment marking the target interface
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Run one session in the foreground; Ctrl-C stops it early
    Record {
        /// Reference WAV file to play
        playback_file: PathBuf,

        /// Duration in seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Sample rate in Hz
        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,

        /// Output file prefix
        #[arg(short, long)]
        output_prefix: Option<String>,

        /// Input device index or name
        #[arg(long)]
        input_device: Option<String>,

        /// Output device index or name
        #[arg(long)]
        output_device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = Config::load(&cli.config)?;
    info!("Bench Recorder v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Devices { pattern } => devices(cfg, pattern).await,
        Command::Record {
            playback_file,
            duration,
            sample_rate,
            output_prefix,
            input_device,
            output_device,
        } => {
            let request = StartRequest {
                playback_file: playback_file.display().to_string(),
                duration,
                sample_rate,
                output_prefix,
                input_device,
                output_device,
            };
            record(cfg, request).await
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let backend = AudioBackendFactory::create();
    info!("Audio backend: {}", backend.name());

    let state = AppState::new(&cfg, backend);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("HTTP server listening on http://{}", addr);
    info!("Recordings directory: {}", cfg.recorder.recordings_dir.display());
    info!("Target device pattern: {}", cfg.recorder.device_pattern);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

async fn devices(cfg: Config, pattern: Option<String>) -> Result<()> {
    let state = AppState::new(&cfg, AudioBackendFactory::create());
    let devices = state.engine.devices(pattern).await?;

    println!("{:<4} {:<40} {:>4} {:>4} {:>8}", "ID", "NAME", "IN", "OUT", "RATE");
    for device in &devices {
        let rate = device
            .sample_rate
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if device.is_target { " *" } else { "" };
        println!(
            "{:<4} {:<40} {:>4} {:>4} {:>8}{}",
            device.id, device.name, device.input_channels, device.output_channels, rate, marker
        );
    }
    Ok(())
}

async fn record(cfg: Config, request: StartRequest) -> Result<()> {
    let state = AppState::new(&cfg, AudioBackendFactory::create());
    let engine = state.engine;

    let session_config = request.resolve(&cfg.recorder)?;
    let session = engine.start(session_config).await?;
    info!(
        "Recording {} ({}); press Ctrl-C to stop early",
        session.id(),
        session.human_id()
    );

    let finished = tokio::select! {
        finished = engine.wait_idle() => finished,
        _ = tokio::signal::ctrl_c() => match engine.stop().await {
            Ok(session) => Some(session),
            // Finished on its own while the signal arrived
            Err(RecorderError::NoActiveSession) => engine.wait_idle().await,
            Err(e) => return Err(e.into()),
        },
    };

    let Some(session) = finished else {
        warn!("Session ended without a record");
        return Ok(());
    };

    info!("Session {} finished: {:?}", session.id(), session.status());
    if let Some(err) = session.error() {
        warn!("Error: {}", err);
    }
    for file in session.files() {
        info!("  {} ({} bytes)", file.path.display(), file.size);
    }
    Ok(())
}
