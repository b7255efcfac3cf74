// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deskline - multi-channel conversation routing and realtime sync.
//!
//! This is the binary entry point for the Deskline service.

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use deskline_config::DesklineConfig;
use deskline_core::DesklineError;

/// Deskline - multi-channel conversation routing and realtime sync.
#[derive(Parser, Debug)]
#[command(name = "deskline", version, about, long_about = None)]
struct Cli {
    /// Explicit config file; the XDG hierarchy is used when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the API server and background workers.
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
    /// Apply pending database migrations and exit.
    Migrate,
}

fn load(path: Option<&PathBuf>) -> DesklineConfig {
    let loaded = match path {
        Some(path) => deskline_config::load_and_validate_path(path),
        None => deskline_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            deskline_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

async fn run_migrate(config: &DesklineConfig) -> Result<(), DesklineError> {
    let db =
        deskline_storage::Database::open(&config.storage.database_path, config.storage.wal_mode)
            .await?;
    db.checkpoint().await?;
    println!(
        "deskline: database {} is up to date",
        config.storage.database_path
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = load(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::CheckConfig) => {
            println!(
                "deskline: config ok (service.name={}, api={}:{})",
                config.service.name, config.api.host, config.api.port
            );
            Ok(())
        }
        Some(Commands::Migrate) => run_migrate(&config).await,
        None => {
            println!("deskline: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
