//! Floe CLI - Iceberg table provisioning and appends.
//!
//! The main entry point for the `floe` CLI binary.

use std::process::ExitCode;

use clap::Parser;
use floe_core::init_logging;
use owo_colors::OwoColorize;

use floe_cli::{Cli, Commands, catalog_error, exit_code};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format.into());
    let config = cli.config();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} failed to start runtime: {e}", "error:".red());
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Ensure(args) => floe_cli::commands::ensure::execute(args, &config).await,
            Commands::Append(args) => floe_cli::commands::append::execute(args, &config).await,
            Commands::Describe(args) => {
                floe_cli::commands::describe::execute(args, &config).await
            }
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red());
            if let Some(catalog) = catalog_error(&err) {
                eprintln!("  kind:   {}", catalog.kind());
                eprintln!("  remedy: {}", catalog.remedy());
            }
            ExitCode::from(u8::try_from(exit_code(&err)).unwrap_or(1))
        }
    }
}
