// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Compile command - print the compiled specification

use clap::Args;
use miette::Result;

use super::{load_pipeline, CompileFlags, MetadataArgs, SourceArgs};
use crate::compiler::{CompilerArgs, StepFilter};
use crate::config::RunnerConfig;
use crate::errors::PodrunError;

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    #[clap(flatten)]
    pub meta: MetadataArgs,

    #[clap(flatten)]
    pub compile: CompileFlags,

    /// Mark all steps except these as never running
    #[clap(long, value_name = "STEP")]
    pub include: Vec<String>,

    /// Mark these steps as never running
    #[clap(long, value_name = "STEP")]
    pub exclude: Vec<String>,
}

/// Run the compile command
pub async fn run(args: CompileArgs, config: &RunnerConfig) -> Result<()> {
    let compiler = args.compile.compiler(config)?;
    let mut meta = args.meta.to_metadata();
    let pipeline = load_pipeline(&args.source.source, &mut meta, &compiler.environ)?;

    let mut spec = compiler.compile(&CompilerArgs {
        pipeline: &pipeline,
        meta: &meta,
    })?;
    StepFilter::new(args.include, args.exclude).apply(&mut spec);

    let json = serde_json::to_string_pretty(&spec).map_err(PodrunError::from)?;
    println!("{}", json);

    Ok(())
}
