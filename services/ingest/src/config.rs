//! CLI surface and environment coupling. §6 — deliberately this small;
//! there is no other configuration loading in this service.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_UDP_PORT: u16 = 8514;
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_ARCHIVE_ROOT: &str = "telemetry/prints";
const ARCHIVE_DIR_ENV: &str = "TELEMETRY_ARCHIVE_DIR";

#[derive(Debug, Parser)]
#[command(name = "ingest", about = "Printer telemetry ingest-and-fan-out service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the UDP listener and HTTP/WebSocket server.
    Serve {
        #[arg(default_value_t = DEFAULT_UDP_PORT)]
        udp_port: u16,
        #[arg(default_value_t = DEFAULT_HTTP_PORT)]
        http_port: u16,
    },
}

/// `TELEMETRY_ARCHIVE_DIR`, falling back to `telemetry/prints` relative to
/// the working directory.
pub fn archive_root() -> PathBuf {
    std::env::var(ARCHIVE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARCHIVE_ROOT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_telemetry_prints_without_the_env_var() {
        std::env::remove_var(ARCHIVE_DIR_ENV);
        assert_eq!(archive_root(), PathBuf::from("telemetry/prints"));
    }
}
