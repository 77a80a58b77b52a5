//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Backend;

#[derive(Parser, Debug)]
#[command(name = "jira-create")]
#[command(about = "Create a JIRA issue from a quick form")]
#[command(version)]
pub struct Cli {
    /// Path to config file (default: $XDG_CONFIG_HOME/jira-quick-create/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Form renderer, overriding the configured one
    #[arg(short, long, value_enum)]
    pub backend: Option<Backend>,

    /// Project to preselect, overriding the configured default
    #[arg(short, long)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the form and create an issue (the default)
    Create,

    /// Inspect or clear the metadata cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Store the API token in the OS keyring, reading it from stdin
    SetToken {
        /// Account email the token belongs to
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// List cached entries and their age
    List,
    /// Delete every cached entry
    Clear,
}
