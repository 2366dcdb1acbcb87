// crates/server/src/config.rs
//! Command-line and environment configuration for the server binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::jobs::DEFAULT_CHANNEL_CAPACITY;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47892;

#[derive(Debug, Clone, Parser)]
#[command(name = "jobwatch-server", version, about = "Job progress registry and push server")]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "JOBWATCH_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to bind; falls back to $PORT, then 47892
    #[arg(long, env = "JOBWATCH_PORT")]
    pub port: Option<u16>,

    /// Buffered push events per owner scope before slow observers lag
    #[arg(long, env = "JOBWATCH_CHANNEL_CAPACITY", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
