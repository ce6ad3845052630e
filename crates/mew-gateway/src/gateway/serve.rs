//! `mew-gateway serve` entrypoint: load a space config, bind the WebSocket + HTTP control
//! plane, and run until Ctrl+C. Grounded on the teacher's `daemon/serve.rs` tracing/shutdown
//! shape (§6.6, §6.7).

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use clap::Args;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::{
    config::SpaceConfig,
    gateway::{Space, audit::AuditLog, audit::env_flag_enabled, http, ws},
    paths::{Layout, default_root},
};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to the space definition (YAML or JSON).
    #[arg(long, value_name = "PATH")]
    pub space: PathBuf,
    /// Address to bind the gateway on.
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8765")]
    pub bind: SocketAddr,
    /// Override the gateway runtime root (audit logs, logs). Falls back to `MEW_ROOT`/`~/.mew`.
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,
    /// Bearer token required for the HTTP control plane; unset disables control-plane auth.
    #[arg(long, value_name = "TOKEN")]
    pub control_token: Option<String>,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let root = args.root.clone().unwrap_or_else(default_root);
    let config = SpaceConfig::from_file(&args.space)
        .with_context(|| format!("failed to load space config at {}", args.space.display()))?;
    let space_name = config.definition().name.clone();

    let layout = Layout::new(root, &space_name);
    let _tracing_guard = init_tracing(&layout)?;

    let audit = AuditLog::spawn(
        layout.clone(),
        env_flag_enabled("ENVELOPE_HISTORY") && env_flag_enabled("GATEWAY_LOGGING"),
        env_flag_enabled("CAPABILITY_DECISIONS") && env_flag_enabled("GATEWAY_LOGGING"),
    );

    let space = Arc::new(Space::new(config, audit));
    let control_token = args.control_token.clone().or_else(|| std::env::var("MEW_CONTROL_TOKEN").ok());

    let ws_router = Router::new().route("/ws", get(ws::upgrade)).with_state(space.clone());
    let control_router = http::router(space.clone(), control_token);
    let app = ws_router.merge(control_router);

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind gateway on {}", args.bind))?;
    info!(addr = %args.bind, space = %space_name, "gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.context("gateway server error")?;

    info!("gateway stopped cleanly");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down gateway"),
        Err(error) => warn!(?error, "failed to listen for Ctrl+C"),
    }
}

fn init_tracing(layout: &Layout) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap();

    let stderr_layer =
        fmt::layer().with_target(true).with_file(true).with_line_number(true).with_writer(std::io::stderr);

    let log_dir = layout.root().join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create gateway log directory {}", log_dir.display()))?;
    let file_appender = rolling::hourly(log_dir, "gateway.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer =
        fmt::layer().with_target(true).with_file(true).with_line_number(true).json().with_writer(file_writer);

    tracing_subscriber::registry().with(env_filter).with(stderr_layer).with(file_layer).init();

    Ok(guard)
}

pub(crate) fn log_startup_error(error: &anyhow::Error) {
    error!(error = ?error, "gateway terminated with error");
}
