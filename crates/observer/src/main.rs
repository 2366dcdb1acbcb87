//! `jobwatch` — watch an owner scope's jobs from the terminal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jobwatch_observer::config::DEFAULT_SERVER_URL;
use jobwatch_observer::{HttpClient, ObserverConfig, ProcessObserver, TerminalPresenter};

#[derive(Debug, Parser)]
#[command(name = "jobwatch", version, about = "Watch long-running jobs for an owner scope")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow an owner scope's jobs until interrupted
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
struct WatchArgs {
    /// Owning client whose jobs to show
    #[arg(long, env = "JOBWATCH_OWNER_SCOPE")]
    owner_scope: String,

    /// Server root URL
    #[arg(long, env = "JOBWATCH_SERVER", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Seconds to wait before re-subscribing after the push stream drops
    #[arg(long, env = "JOBWATCH_RECONNECT_SECS", default_value_t = 5)]
    reconnect_secs: u64,

    /// Seconds after a transcription starts before polling its status
    #[arg(long, env = "JOBWATCH_POLL_GRACE_SECS", default_value_t = 30)]
    poll_grace_secs: u64,

    /// Seconds between status polls
    #[arg(long, env = "JOBWATCH_POLL_INTERVAL_SECS", default_value_t = 30)]
    poll_interval_secs: u64,

    /// Seconds before an action plan is reported as still running
    #[arg(long, env = "JOBWATCH_ACTION_PLAN_TIMEOUT_SECS", default_value_t = 600)]
    action_plan_timeout_secs: u64,
}

impl WatchArgs {
    fn config(&self) -> ObserverConfig {
        ObserverConfig {
            owner_scope: self.owner_scope.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_secs),
            poll_grace: Duration::from_secs(self.poll_grace_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            action_plan_timeout: Duration::from_secs(self.action_plan_timeout_secs),
        }
    }
}

async fn watch(args: WatchArgs) -> Result<()> {
    let client = Arc::new(HttpClient::new(&args.server)?);
    eprintln!(
        "\n  jobwatch v{} \u{2192} {} (owner scope {})\n",
        env!("CARGO_PKG_VERSION"),
        client.base_url(),
        args.owner_scope
    );

    let handle = ProcessObserver::spawn(
        args.config(),
        client.clone(),
        client,
        TerminalPresenter::new(),
    );

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobwatch_observer=info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Watch(args) => watch(args).await,
    }
}
