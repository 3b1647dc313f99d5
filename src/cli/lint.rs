// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Lint command - check a pipeline for structural errors

use clap::Args;
use colored::Colorize;
use miette::Result;
use std::collections::BTreeMap;

use super::{load_pipeline, MetadataArgs, SourceArgs};
use crate::errors::PodrunError;
use crate::manifest::Linter;
use crate::utils::colors;

#[derive(Args, Debug, Clone)]
pub struct LintArgs {
    #[clap(flatten)]
    pub source: SourceArgs,

    #[clap(flatten)]
    pub meta: MetadataArgs,
}

/// Run the lint command
pub async fn run(args: LintArgs) -> Result<()> {
    println!("{}", "Linting pipeline...".bold());
    println!();

    let mut meta = args.meta.to_metadata();
    let pipeline = match load_pipeline(&args.source.source, &mut meta, &BTreeMap::new()) {
        Ok(p) => p,
        Err(e) => {
            colors::print_error("Failed to load pipeline");
            return Err(e.into());
        }
    };
    colors::print_success(&format!(
        "Pipeline '{}' parsed ({} steps, {} services)",
        pipeline.name,
        pipeline.steps.len(),
        pipeline.services.len()
    ));

    let report = Linter::lint(&pipeline, &meta.repo);

    if !report.errors.is_empty() {
        colors::print_section("Errors");
        for error in &report.errors {
            colors::print_error(error);
        }
    }

    if report.has_warnings() {
        colors::print_section("Warnings");
        for warning in &report.warnings {
            colors::print_warning(warning);
        }
    }

    println!();
    if report.is_valid() {
        println!("{}", colors::success("Pipeline is valid"));
        Ok(())
    } else {
        Err(PodrunError::Lint {
            pipeline: pipeline.name.clone(),
            errors: report.errors,
        }
        .into())
    }
}
