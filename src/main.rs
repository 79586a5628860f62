use anyhow::{Context, Result};
use avatar_stream::{
    audio::{AudioSourceConfig, FileAudioSource},
    create_router,
    token::{FileTokenService, StaticTokenService},
    AppState, AvatarRuntime, Config, ControlMessage, LoopbackRuntime, NatsClient,
    PreviewVideoSink, StreamOrchestrator, TokenLifecycleManager, TokenService, WavAudioSink,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Stream a talking avatar driven by pushed audio
#[derive(Debug, Parser)]
#[command(name = "avatar-stream", version)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/avatar-stream")]
    config: String,

    /// Avatar model file (overrides runtime.model_path)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Static runtime token
    #[arg(long, env = "AVATAR_RUNTIME_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Read the token from this file on every refresh
    #[arg(long, conflicts_with = "token")]
    token_file: Option<PathBuf>,

    #[arg(long, env = "AVATAR_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// Token issuing endpoint (overrides token.api_url)
    #[arg(long)]
    api_url: Option<String>,

    /// Audio file pushed once at startup
    #[arg(long)]
    audio_file: Option<PathBuf>,

    /// Audio file streamed in real time as live input
    #[arg(long)]
    stream_audio: Option<PathBuf>,

    /// Skip TLS verification for the token endpoint
    #[arg(long)]
    insecure: bool,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut cfg = Config::load(&args.config)?;

    if let Some(model) = args.model {
        cfg.runtime.model_path = model;
    }
    if let Some(api_url) = args.api_url {
        cfg.token.api_url = api_url;
    }
    if args.insecure {
        cfg.token.insecure = true;
    }
    if args.max_frames.is_some() {
        cfg.stream.max_frames = args.max_frames;
    }
    cfg.runtime.fps = cfg.stream.target_fps;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Session: {}", cfg.stream.session_id);

    let runtime = LoopbackRuntime::create(cfg.runtime.clone()).context("Failed to create runtime")?;
    let runtime: Arc<dyn AvatarRuntime> = Arc::new(runtime);

    // Initial token; without it the runtime cannot start
    let service: Arc<dyn TokenService> = match (args.token, args.token_file) {
        (_, Some(path)) => Arc::new(FileTokenService::new(path)),
        (Some(token), None) => Arc::new(StaticTokenService::new(token)),
        (None, None) => anyhow::bail!("No token: pass --token, --token-file or set AVATAR_RUNTIME_TOKEN"),
    };
    let mut token_manager =
        TokenLifecycleManager::new(service, cfg.token.to_request_config(args.api_secret));
    token_manager.set_fingerprint(runtime.fingerprint());

    let token = token_manager.request_initial().await?;
    if let Some(expires_at) = token.expires_at() {
        info!("Token expires at {}", expires_at);
    }
    runtime.set_token(token)?;

    let (width, height) = runtime.frame_size();
    let video_sink = PreviewVideoSink::new((width, height), cfg.output.video_buffer_size);
    let audio_sink = WavAudioSink::new(
        &cfg.output.audio_path,
        runtime.sample_rate(),
        1,
        cfg.output.audio_buffer_size,
    );

    let mut orchestrator = StreamOrchestrator::new(
        cfg.stream.clone(),
        Arc::clone(&runtime),
        Box::new(video_sink),
        Box::new(audio_sink),
    )
    .with_token_refresh(token_manager);

    if let Some(path) = args.stream_audio {
        info!("Streaming live audio from {}", path.display());
        let source = FileAudioSource::new(
            path,
            AudioSourceConfig {
                target_sample_rate: runtime.sample_rate(),
                ..AudioSourceConfig::default()
            },
        );
        orchestrator = orchestrator.with_audio_source(Box::new(source));
    }

    let controller = orchestrator.controller();
    let shutdown = orchestrator.shutdown_token();
    let status = orchestrator.status();

    if let Some(path) = args.audio_file {
        controller.push(ControlMessage::push_audio(path))?;
    }

    let http = if cfg.service.http.enabled {
        let state = AppState::new(controller.clone(), status.clone(), shutdown.clone());
        Some(spawn_http(&cfg, state, shutdown.clone()).await?)
    } else {
        None
    };

    let nats = match &cfg.nats.url {
        Some(url) => match NatsClient::connect(url, cfg.stream.session_id.clone()).await {
            Ok(client) => Some(
                avatar_stream::nats::spawn_bridge(
                    client,
                    controller.clone(),
                    status.clone(),
                    shutdown.clone(),
                )
                .await?,
            ),
            Err(e) => {
                warn!("NATS control disabled: {:#}", e);
                None
            }
        },
        None => None,
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl+C received, stopping");
                    shutdown.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
            }
        });
    }

    let result = orchestrator.run().await;

    // the session is over either way; release the outer surfaces
    shutdown.cancel();
    for (name, handle) in [("HTTP server", http), ("NATS bridge", nats)] {
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("{} panicked: {}", name, e);
            }
        }
    }

    let stats = result?;
    info!(
        "Streamed {} frames ({} audio chunks, {} dropped) in {:.1}s",
        stats.video_frames, stats.audio_chunks_delivered, stats.audio_chunks_dropped, stats.duration_secs
    );

    Ok(())
}

async fn spawn_http(
    cfg: &Config,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    let app = create_router(state);
    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            error!("HTTP server failed: {}", e);
        }
    }))
}
