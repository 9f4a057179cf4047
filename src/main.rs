//! tableau-mcp: MCP server for preparing and publishing data to Tableau
//!
//! Converts spreadsheets to Hyper extracts, publishes them to Tableau Server,
//! and checks what is already published, on behalf of an AI assistant.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use tableau_mcp::config;
use tableau_mcp::mcp::{McpServer, ToolRouter};
use tableau_mcp::tableau::{Converter, HyperdWriter, TableauBackend};

/// MCP server for Tableau Server.
///
/// Reads its settings from the environment (optionally seeded from a `.env`
/// file) and speaks MCP over stdin and stdout.
#[derive(Parser, Debug)]
#[command(name = "tableau-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Environment file to load before reading settings (default: ./.env if present)
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber; logs go to stderr, stdout carries MCP.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match config::load_config(args.env_file.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    // GPLv3 Section 5d notice
    eprintln!(
        "tableau-mcp {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = cfg.server_base(),
        site = %cfg.site_id,
        project = %cfg.default_project_name,
        file_directory = %cfg.default_file_directory.display(),
        "Starting tableau-mcp server"
    );

    let writer = Arc::new(HyperdWriter::new(&cfg.hyperd_path));
    let converter = Converter::new(&cfg.default_file_directory, writer);
    let backend = Arc::new(TableauBackend::new(&cfg, converter));
    let router = ToolRouter::new(backend, &cfg.default_project_name);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    // Stdio handles must be created inside the runtime
    let result = runtime.block_on(async {
        let mut server = McpServer::new(router);
        info!("MCP server ready, waiting for client connection...");
        server.run().await
    });

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(2, false, "warn"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "INFO"), Level::INFO);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }
}
