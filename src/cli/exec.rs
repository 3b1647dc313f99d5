// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Exec command - compile and run a pipeline locally

use clap::Args;
use colored::Colorize;
use miette::Result;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::{load_pipeline, CompileFlags, MetadataArgs, SourceArgs};
use crate::compiler::{CompilerArgs, StepFilter};
use crate::config::RunnerConfig;
use crate::engine::ProcessEngine;
use crate::errors::PodrunError;
use crate::manifest::Linter;
use crate::runtime::{ExecContext, Execer, ExecerConfig, PipelineState};
use crate::utils::colors;

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    #[clap(flatten)]
    pub meta: MetadataArgs,

    #[clap(flatten)]
    pub compile: CompileFlags,

    /// Run only the named steps
    #[clap(long, value_name = "STEP")]
    pub include: Vec<String>,

    /// Skip the named steps
    #[clap(long, value_name = "STEP")]
    pub exclude: Vec<String>,

    /// Print the final pipeline state as JSON
    #[clap(long)]
    pub dump: bool,

    /// Colorize step output [default: when stdout is a terminal]
    #[clap(long)]
    pub pretty: Option<bool>,

    /// Maximum concurrently running steps, 0 for unlimited
    #[clap(long)]
    pub procs: Option<usize>,

    /// Seconds to wait for a step to start
    #[clap(long, value_name = "SECONDS")]
    pub engine_container_start_timeout: Option<u64>,

    /// Seconds a cancelled step may take to stop
    #[clap(long, value_name = "SECONDS")]
    pub kill_grace: Option<u64>,
}

impl ExecArgs {
    fn execer_config(&self, config: &RunnerConfig) -> ExecerConfig {
        let defaults = ExecerConfig::default();
        let start_timeout = self
            .engine_container_start_timeout
            .or(config.engine.container_start_timeout)
            .map(Duration::from_secs)
            .or(defaults.start_timeout);
        ExecerConfig {
            procs: self.procs.or(config.procs).unwrap_or(defaults.procs),
            start_timeout,
            kill_grace: self
                .kill_grace
                .or(config.engine.kill_grace)
                .map(Duration::from_secs)
                .unwrap_or(defaults.kill_grace),
        }
    }
}

/// Run the exec command
pub async fn run(args: ExecArgs, config: &RunnerConfig) -> Result<()> {
    let compiler = args.compile.compiler(config)?;
    let mut meta = args.meta.to_metadata();
    let pipeline = load_pipeline(&args.source.source, &mut meta, &compiler.environ)?;

    let warnings = Linter::lint(&pipeline, &meta.repo).into_result(&pipeline.name)?;
    for warning in &warnings {
        warn!(pipeline = %pipeline.name, "{}", warning);
    }

    let mut spec = compiler.compile(&CompilerArgs {
        pipeline: &pipeline,
        meta: &meta,
    })?;
    StepFilter::new(args.include.clone(), args.exclude.clone()).apply(&mut spec);

    let mut state = PipelineState::new(&meta, &spec);

    let ctx = ExecContext::with_timeout(pipeline_timeout(meta.repo.timeout));
    ctx.listen_for_signals();

    let cwd = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
    let pretty = args.pretty.unwrap_or_else(|| std::io::stdout().is_terminal());
    let engine = Arc::new(ProcessEngine::new(cwd, pretty));
    let execer = Execer::new(engine, args.execer_config(config));

    let result = execer.exec(&ctx, Arc::new(spec), &mut state).await;
    if let Some(reason) = ctx.reason() {
        warn!(%reason, "pipeline cancelled");
    }

    if args.dump {
        let json = serde_json::to_string_pretty(&state).map_err(PodrunError::from)?;
        println!("{}", json);
    }

    if let Err(e) = result {
        error!(error = %e, "pipeline execution failed");
        return Err(e.into());
    }

    if !args.dump {
        print_summary(&state, pretty);
    }

    if state.is_unsuccessful() {
        warn!(status = %state.stage.status, "pipeline did not pass");
        std::process::exit(1);
    }

    Ok(())
}

/// Pipeline deadline from the repository timeout in minutes, 0 for none
fn pipeline_timeout(minutes: u64) -> Option<Duration> {
    match minutes {
        0 => None,
        minutes => Some(Duration::from_secs(minutes.saturating_mul(60))),
    }
}

fn print_summary(state: &PipelineState, pretty: bool) {
    colored::control::set_override(pretty && colors::should_use_colors());
    println!();
    for step in &state.stage.steps {
        let mut line = format!("{} {}", colors::status(step.status), step.name);
        if step.exit_code != 0 {
            line.push_str(&format!(" (exit code {})", step.exit_code));
        }
        if step.err_ignore && step.status.is_failed() {
            line.push_str(&format!(" {}", "[ignored]".dimmed()));
        }
        if let Some(error) = &step.error {
            line.push_str(&format!(": {}", error));
        }
        println!("  {}", line);
    }
    println!();
    println!(
        "{} {}",
        "Pipeline".bold(),
        colors::status(state.stage.status)
    );
    colored::control::unset_override();
}
