use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use qhoami::app;
use qhoami::cli::{Cli, Commands};
use qhoami::config::{self, QhoamiConfig};
use qhoami::identity::IdentityQuery;
use qhoami::repository::SessionRepository;
use qhoami::util::setup_tracing;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("qhoami error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<u8> {
    setup_tracing();
    let cli = Cli::parse();
    let config = QhoamiConfig::load_or_default();

    let appdata = cli.appdata.clone().unwrap_or_else(|| config.appdata_path());
    let repository = SessionRepository::new(config::workspace_storage_path(&appdata));
    let query = IdentityQuery {
        session_id: cli.session_id,
        workspace_id: cli.workspace_hash,
    };

    match cli.command {
        Some(Commands::Identity) | None => app::print_identity(&config, &repository, &query),
        Some(Commands::Status) => app::print_status(&config, &repository, &query),
        Some(Commands::Reboots) => app::print_reboots(&repository, &query),
        Some(Commands::Probe { workspace_root }) => {
            app::write_probe(&config, &repository, &query, &workspace_root)
        }
    }
}
