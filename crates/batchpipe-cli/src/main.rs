//! batchpipe CLI - Main entry point
#![recursion_limit = "256"]

use batchpipe_cli::config::Config;
use batchpipe_cli::{commands, Cli, Commands, RunOptions};
use batchpipe_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed flags
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = &cli.command else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let log_config = if cli.verbose {
        // Verbose mode: debug to console
        LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Console)
            .filter_directives("aws_config=warn,aws_smithy_runtime=warn,hyper=info")
            .build()
    } else {
        // Normal mode: info to console and to the rolling log file
        LogConfig::builder()
            .level(LogLevel::Info)
            .output(LogOutput::Both)
            .filter_directives("aws_config=warn,aws_smithy_runtime=warn")
            .build()
    };

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        },
    };

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping");
            signal.cancel();
        }
    });

    let result = execute_command(&cli, command, cancel).await;

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "Command failed");
            eprintln!("Error: {e}");
            e.exit_code()
        },
    };

    // Flush the file writer before exiting
    drop(guard);
    process::exit(code);
}

/// Execute the CLI command
async fn execute_command(
    cli: &Cli,
    command: &Commands,
    cancel: CancellationToken,
) -> batchpipe_cli::Result<()> {
    if let Commands::Models = command {
        return commands::models::run();
    }

    let mut config = Config::from_env(cli.config.as_deref())?;
    if let Some(key) = &cli.api_key {
        config.api_key = Some(key.clone());
    }
    info!(command = ?command, source = ?config.source, "Starting");

    match command {
        Commands::Run(args) => commands::run::run(config, RunOptions::from(args), cancel).await,
        Commands::DryRun(args) => {
            commands::dry_run::run(config, RunOptions::from(args), cancel).await
        },
        Commands::Submit(args) => {
            commands::submit::run(config, RunOptions::from(args), cancel).await
        },
        Commands::Resume { job_id } => commands::resume::run(config, job_id, cancel).await,
        Commands::CheckOutputs => commands::check_outputs::run(config, cancel).await,
        Commands::Status => commands::status::run(&config).await,
        Commands::Models => commands::models::run(),
    }
}
