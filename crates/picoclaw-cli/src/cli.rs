use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "picoclaw", version, about = "Personal-assistant skill orchestrator")]
pub struct Cli {
    /// Path to the config file (default: $PERSONAL_OS_CONFIG or ~/.picoclaw/config.json).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single turn of the tool-call loop, or enter an interactive prompt loop.
    Agent {
        /// One-shot message. Omit to read from stdin interactively.
        #[arg(long, short = 'm')]
        message: Option<String>,
    },

    /// Run the long-running daemon: scheduler fabric, channel adapters, heartbeat.
    Gateway {
        /// Raise the log filter to debug.
        #[arg(long, short = 'd')]
        debug: bool,
    },

    /// Interactive setup wizard (not implemented by the core).
    Setup,

    /// Print the version and exit.
    Version,
}
