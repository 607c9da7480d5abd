#![deny(warnings)]

use anyhow::Context;
use clap::Parser;
use emotion_api_core::config::{
    resolve_bind_addr, resolve_path, resolve_string_with_default, resolve_upload_limit,
    AppConfig, ArtifactPaths, CorsOrigin, Env, StdEnv, DEFAULT_CORS_ORIGIN, DEFAULT_LABELS_PATH,
    DEFAULT_MODEL_PATH, DEFAULT_SCALER_PATH, DEFAULT_SCRATCH_DIR, ENV_CORS_ORIGIN,
    ENV_LABELS_PATH, ENV_MODEL_PATH, ENV_SCALER_PATH, ENV_SCRATCH_DIR,
};
use emotion_api_core::http::{router, AppState};
use emotion_api_core::model::EmotionModel;
use emotion_api_core::service::PredictionService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emotion-api")]
#[command(about = "Speech emotion prediction over HTTP")]
struct Args {
    /// Address to listen on [env: EMOTION_API_BIND] [default: 127.0.0.1:5000]
    #[arg(long)]
    bind: Option<String>,

    /// Browser origin allowed by CORS [env: EMOTION_API_CORS_ORIGIN]
    #[arg(long)]
    cors_origin: Option<String>,

    /// Directory for in-flight uploads [env: EMOTION_API_SCRATCH_DIR]
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    #[arg(long)]
    model_path: Option<PathBuf>,

    #[arg(long)]
    scaler_path: Option<PathBuf>,

    #[arg(long)]
    labels_path: Option<PathBuf>,

    /// Request body limit in bytes [env: EMOTION_API_MAX_UPLOAD_BYTES]
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let env = StdEnv;
    let cfg = build_config(args, &env)?;

    tracing::info!(
        bind = %cfg.bind,
        cors_origin = %cfg.cors_origin,
        scratch_dir = %cfg.scratch_dir.display(),
        max_upload_bytes = cfg.upload_limit.max_bytes,
        "config loaded"
    );

    serve(cfg).await
}

async fn serve(cfg: AppConfig) -> anyhow::Result<()> {
    let model = EmotionModel::load(&cfg.artifacts).context("failed to load model artifacts")?;
    tracing::info!(
        layers = model.classifier().depth(),
        input_dim = model.classifier().input_dim(),
        classes = model.labels().len(),
        "model loaded"
    );

    let service = PredictionService::new(Arc::new(model), cfg.scratch_dir.clone());
    let app = router(AppState::new(service), &cfg)?;

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind))?;
    tracing::info!(addr = %cfg.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let bind = resolve_bind_addr(args.bind, env)?;
    let cors_origin = CorsOrigin::new(resolve_string_with_default(
        args.cors_origin,
        ENV_CORS_ORIGIN,
        env,
        DEFAULT_CORS_ORIGIN,
    ))?;
    let scratch_dir = resolve_path(args.scratch_dir, ENV_SCRATCH_DIR, env, DEFAULT_SCRATCH_DIR)?;
    let artifacts = ArtifactPaths {
        classifier: resolve_path(args.model_path, ENV_MODEL_PATH, env, DEFAULT_MODEL_PATH)?,
        scaler: resolve_path(args.scaler_path, ENV_SCALER_PATH, env, DEFAULT_SCALER_PATH)?,
        labels: resolve_path(args.labels_path, ENV_LABELS_PATH, env, DEFAULT_LABELS_PATH)?,
    };
    let upload_limit = resolve_upload_limit(args.max_upload_bytes, env)?;

    Ok(AppConfig {
        bind,
        cors_origin,
        scratch_dir,
        artifacts,
        upload_limit,
    })
}
