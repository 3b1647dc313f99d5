// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Graph command - visualize the compiled step graph

use clap::Args;
use miette::Result;

use super::{load_pipeline, CompileFlags, GraphFormat, MetadataArgs, SourceArgs};
use crate::compiler::{graph, CompilerArgs};
use crate::config::RunnerConfig;

#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    #[clap(flatten)]
    pub meta: MetadataArgs,

    #[clap(flatten)]
    pub compile: CompileFlags,

    /// Output format (text, dot, mermaid)
    #[clap(short, long, default_value = "text")]
    pub format: GraphFormat,
}

/// Run the graph command
pub async fn run(args: GraphArgs, config: &RunnerConfig) -> Result<()> {
    let compiler = args.compile.compiler(config)?;
    let mut meta = args.meta.to_metadata();
    let pipeline = load_pipeline(&args.source.source, &mut meta, &compiler.environ)?;

    let spec = compiler.compile(&CompilerArgs {
        pipeline: &pipeline,
        meta: &meta,
    })?;

    let output = match args.format {
        GraphFormat::Text => graph::render_text(&spec.steps)?,
        GraphFormat::Dot => graph::render_dot(&spec.steps)?,
        GraphFormat::Mermaid => graph::render_mermaid(&spec.steps)?,
    };

    println!("{}", output);

    Ok(())
}
