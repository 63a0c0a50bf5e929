//! Taxi Trips CLI - Main entry point

use clap::Parser;
use std::process;
use taxitrips_cli::commands;
use taxitrips_cli::{Cli, Commands};
use taxitrips_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tracing::error;

fn main() {
    let cli = Cli::parse();

    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    if cli.command.is_none() {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    }

    // Stdout carries CSV output, so logs always go to stderr or a file
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("taxitrips")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_over(log_config.clone()).unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config);

    if let Err(e) = execute_command(&cli) {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn execute_command(cli: &Cli) -> taxitrips_cli::Result<()> {
    let Some(ref command) = cli.command else {
        unreachable!("Command should have been validated in main");
    };
    let config = cli.config()?;

    match command {
        Commands::Normalize {
            verifone,
            cmt,
            inputs,
            output,
        } => commands::normalize::run(&config, verifone, cmt, inputs, output.as_deref()),

        Commands::Generalize {
            input,
            regions,
            output,
        } => commands::generalize::run(&config, input, regions, output.as_deref()),

        Commands::Upload {
            input,
            chunk_size,
            table,
            columns,
        } => commands::upload::run(&config, input, *chunk_size, table.as_deref(), *columns),

        Commands::UpdateAnon { table } => commands::anonymize::update(&config, table.as_deref()),

        Commands::Anonymize { input, output } => {
            commands::anonymize::run(&config, input, output.as_deref())
        }

        Commands::Validate { input, scale, json } => {
            commands::validate::run(&config, input, *scale, *json)
        }
    }
}
