//! SaaSKit Web Server
//!
//! Serves the JSON API, the Stripe webhook and the health endpoints.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use saaskit_web::app::{build_router, spawn_background_tasks, AppState};
use saaskit_web::config::AppConfig;
use tracing_subscriber::EnvFilter;

/// SaaSKit Web Server
#[derive(Parser, Debug)]
#[command(name = "sk-web")]
#[command(author = "SaaSKit Team <team@saaskit.dev>")]
#[command(version)]
#[command(about = "Rate-limited JSON API and Stripe webhook reconciler")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose when set
    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let sweep_interval = config.sweep_interval;

    let state = AppState::from_config(config);
    let _sweeper = spawn_background_tasks(&state, sweep_interval);
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("SaaSKit Web listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("SaaSKit Web stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
