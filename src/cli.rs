//! Binary entrypoint surface: subcommands for the live loop, a one-shot
//! cycle, and a read-only status report.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cryptoedge")]
#[command(author)]
#[command(version)]
#[command(about = "Crypto prediction-market arbitrage engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml (+ optional <env>.toml overlay), or a single TOML file.
    #[arg(short, long, default_value = "config")]
    pub config: String,

    /// Overlay file name (without extension) layered on top of default.toml.
    #[arg(short, long, default_value = "development")]
    pub env: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the trading bot continuously until SIGINT/SIGTERM.
    Run,
    /// Run exactly one cycle of the trading state machine and exit.
    Once,
    /// Print a human-readable summary of the persisted state file and exit.
    Status,
}
