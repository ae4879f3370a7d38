//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use dashlight_shared::VERSION;

#[derive(Parser, Debug)]
#[command(name = "dashlightctl")]
#[command(about = "Dashlight - diagnose dashboard warning lights and common car faults", long_about = None)]
#[command(version = VERSION)]
pub struct Cli {
    /// Config file (default: $DASHLIGHT_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive diagnosis in the terminal
    Chat {
        /// Start directly with this warning light
        #[arg(long, conflicts_with = "scenario")]
        light: Option<String>,

        /// Start directly with this scenario graph
        #[arg(long)]
        scenario: Option<String>,

        /// Disable colors
        #[arg(long)]
        plain: bool,
    },

    /// Run one turn: JSON request on stdin, JSON envelope on stdout
    Turn,

    /// List the warning lights in the knowledge base
    Lights,

    /// List the scenario graphs
    Scenarios,

    /// Validate a knowledge base file (default: the configured one)
    ValidateKb {
        path: Option<PathBuf>,

        /// Scenario graphs file to validate alongside
        #[arg(long)]
        scenarios: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config,

    /// Show version and build details
    Version,
}
