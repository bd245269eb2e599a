use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "qhoami",
    version,
    about = "Report the Q-Semver identity and reboot history of an editor chat session"
)]
pub struct Cli {
    /// Editor user-data directory (defaults to the detected install).
    #[arg(long, global = true, value_name = "PATH")]
    pub appdata: Option<PathBuf>,
    /// Workspace storage id (defaults to the most recently active one).
    #[arg(long = "workspace-hash", global = true, value_name = "HASH")]
    pub workspace_hash: Option<String>,
    /// Session id (defaults to the most recently modified session).
    #[arg(long = "session-id", global = true, value_name = "UUID")]
    pub session_id: Option<String>,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the identity record as JSON (default).
    Identity,
    /// Print a human-readable identity and context-health summary.
    Status,
    /// Print raw and ground-truth reboot events for one session file.
    Reboots,
    /// Write the context probe into a workspace's inbox, if it exists.
    Probe {
        #[arg(long, value_name = "PATH")]
        workspace_root: PathBuf,
    },
}
