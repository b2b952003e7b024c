//! CLI argument definitions for the mg7d agent.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// mg7d observability-and-control agent.
///
/// Tails a game server's status log, exposes derived telemetry as
/// Prometheus gauges, and applies configured guardrail policies over
/// the server's telnet admin port.
#[derive(Parser, Debug)]
#[command(name = "mg7d")]
#[command(version, about, long_about = None)]
pub struct AgentCli {
    /// Path to the YAML configuration file.
    #[arg(default_value = "config.yaml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the agent.
    #[arg(long)]
    pub validate: bool,
}
