//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Headless tandem client
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: tandem.toml)
    #[arg(short = 'C', long, global = true, default_value = "tandem.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the client until Ctrl+C, reading actions from stdin
    #[command(visible_alias = "r")]
    Run {
        /// Push this page after startup
        #[arg(short, long)]
        page: Option<String>,
    },

    /// Inspect or erase the persisted stack
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Print the persisted state
    Show,
    /// Forget the persisted stack (variables are kept)
    Erase,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// List cached responses
    List,
    /// Remove every cached response
    Purge,
}
