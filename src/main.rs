//! ShopBridge server binary
//!
//! Loads configuration from the environment, wires the service over the
//! HTTPS platform client, and serves the HTTP surface with the background
//! workers running alongside.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use shopbridge::config::AppConfig;
use shopbridge::http::{router, AppState};
use shopbridge::platform::HttpPlatformClient;

/// ShopBridge merchant-platform integration server
#[derive(Parser, Debug)]
#[command(name = "shopbridge")]
#[command(version)]
#[command(about = "OAuth install flow, signed webhooks, background data sync")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8000")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let platform =
        Arc::new(HttpPlatformClient::new(config.clone()).context("building platform client")?);

    let (state, workers) = AppState::new(config, platform);
    let worker_handles = workers.spawn();

    // Expired OAuth attempts are swept on a timer; consume() covers the
    // correctness path, this keeps the table from growing unbounded.
    let sweeper_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Ok(swept) = sweeper_state.attempts.sweep_expired().await {
                if swept > 0 {
                    tracing::debug!(swept, "expired oauth attempts removed");
                }
            }
        }
    });

    let app = router(state);
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(addr = %addr, version = shopbridge::VERSION, "shopbridge listening");
    axum::serve(listener, app).await.context("serving")?;

    for handle in worker_handles {
        handle.abort();
    }
    Ok(())
}
