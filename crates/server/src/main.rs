// crates/server/src/main.rs
//! Jobwatch server binary.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jobwatch_server::{create_app, init_metrics, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobwatch_server=info".into()),
        )
        .init();

    let config = ServerConfig::parse();

    init_metrics();

    let state = AppState::with_channel_capacity(config.channel_capacity);
    let app = create_app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, channel_capacity = config.channel_capacity, "jobwatch server listening");
    eprintln!("\n  jobwatch-server v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  \u{2192} http://{}\n", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
