// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! podrun - local CI pipeline runner
//!
//! Compile declarative CI pipelines into step graphs and run them.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podrun::cli::{Cli, Commands};
use podrun::config::RunnerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let config = RunnerConfig::load(cli.config.as_deref())?;
    let log = config.log.with_flags(cli.debug, cli.trace);

    // Initialize tracing; logs go to stderr so step output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log.directive().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Exec(args) => podrun::cli::exec::run(args, &config).await,
        Commands::Compile(args) => podrun::cli::compile::run(args, &config).await,
        Commands::Graph(args) => podrun::cli::graph::run(args, &config).await,
        Commands::Lint(args) => podrun::cli::lint::run(args).await,
    }
}
