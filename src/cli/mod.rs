// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for podrun.

pub mod compile;
pub mod exec;
pub mod graph;
pub mod lint;

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::compiler::{Compiler, StaticSecrets, DEFAULT_PRIVILEGED, DEFAULT_TMATE_IMAGE};
use crate::config::{ResourceConfig, RunnerConfig};
use crate::engine::Tmate;
use crate::errors::PodrunError;
use crate::manifest::{substitute, Manifest, Pipeline};
use crate::metadata::RunMetadata;
use crate::resource::{self, Resources};

/// Local CI pipeline runner
///
/// Compile drone-style kubernetes pipelines into step graphs and run them.
#[derive(Parser, Debug)]
#[clap(
    name = "podrun",
    version,
    about = "Compile declarative CI pipelines into step graphs and run them",
    long_about = None,
    after_help = "Examples:\n\
        podrun lint                     Check .drone.yml for structural errors\n\
        podrun graph --format dot       Show the compiled step graph\n\
        podrun compile                  Print the compiled specification\n\
        podrun exec --include build     Run only the build step\n\n\
        See 'podrun <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[clap(long, global = true, env = "PODRUN_DEBUG")]
    pub debug: bool,

    /// Enable trace logging
    #[clap(long, global = true, env = "PODRUN_TRACE")]
    pub trace: bool,

    /// Configuration file (defaults to the user config directory)
    #[clap(long, global = true, env = "PODRUN_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a pipeline
    Exec(exec::ExecArgs),

    /// Print the compiled pipeline specification as JSON
    Compile(compile::CompileArgs),

    /// Show the compiled step graph
    Graph(graph::GraphArgs),

    /// Check a pipeline for structural errors
    Lint(lint::LintArgs),
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Parse a `key=value` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Pipeline source file
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Pipeline file
    #[clap(default_value = ".drone.yml")]
    pub source: PathBuf,
}

/// Repository, build and stage being simulated
#[derive(Args, Debug, Clone, Default)]
pub struct MetadataArgs {
    /// Repository slug (namespace/name)
    #[clap(long = "repo", value_name = "SLUG")]
    pub repo: Option<String>,

    /// Repository clone URL
    #[clap(long)]
    pub repo_http: Option<String>,

    /// Repository default branch
    #[clap(long)]
    pub repo_branch: Option<String>,

    /// Mark the repository private
    #[clap(long)]
    pub repo_private: bool,

    /// Trust the repository (privileged steps, host volumes)
    #[clap(long)]
    pub trusted: bool,

    /// Pipeline timeout in minutes, 0 disables it
    #[clap(long, value_name = "MINUTES")]
    pub timeout: Option<u64>,

    /// Build number
    #[clap(long)]
    pub build_number: Option<i64>,

    /// Build event (push, pull_request, tag, promote, cron, custom)
    #[clap(long)]
    pub event: Option<String>,

    /// Build action
    #[clap(long)]
    pub action: Option<String>,

    /// Commit branch
    #[clap(long)]
    pub branch: Option<String>,

    /// Commit ref
    #[clap(long = "ref", value_name = "REF")]
    pub reference: Option<String>,

    /// Commit sha
    #[clap(long)]
    pub commit: Option<String>,

    /// Commit message
    #[clap(long)]
    pub message: Option<String>,

    /// Commit author
    #[clap(long)]
    pub author: Option<String>,

    /// Deployment target
    #[clap(long)]
    pub deploy_to: Option<String>,

    /// Cron job name
    #[clap(long)]
    pub cron: Option<String>,

    /// Mark the build as a debug build
    #[clap(long)]
    pub build_debug: bool,

    /// Custom build parameters
    #[clap(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Pipeline (stage) to run; defaults to the first kubernetes pipeline
    #[clap(long)]
    pub stage_name: Option<String>,

    /// Stage number
    #[clap(long)]
    pub stage_number: Option<i64>,

    /// Runner machine name
    #[clap(long)]
    pub machine: Option<String>,

    /// Server host
    #[clap(long)]
    pub system_host: Option<String>,

    /// Server protocol
    #[clap(long)]
    pub system_proto: Option<String>,
}

impl MetadataArgs {
    /// Build run metadata, starting from local defaults
    pub fn to_metadata(&self) -> RunMetadata {
        let mut meta = RunMetadata::default();
        let set = |target: &mut String, value: &Option<String>| {
            if let Some(value) = value {
                *target = value.clone();
            }
        };

        set(&mut meta.repo.slug, &self.repo);
        set(&mut meta.repo.http_url, &self.repo_http);
        set(&mut meta.repo.branch, &self.repo_branch);
        meta.repo.private = self.repo_private;
        meta.repo.trusted = self.trusted;
        if let Some(timeout) = self.timeout {
            meta.repo.timeout = timeout;
        }

        if let Some(number) = self.build_number {
            meta.build.number = number;
        }
        set(&mut meta.build.event, &self.event);
        set(&mut meta.build.action, &self.action);
        set(&mut meta.build.branch, &self.branch);
        match &self.reference {
            Some(reference) => meta.build.reference = reference.clone(),
            None => meta.build.reference = format!("refs/heads/{}", meta.build.branch),
        }
        set(&mut meta.build.commit, &self.commit);
        set(&mut meta.build.message, &self.message);
        set(&mut meta.build.author, &self.author);
        set(&mut meta.build.target, &self.deploy_to);
        set(&mut meta.build.cron, &self.cron);
        meta.build.debug = self.build_debug;
        meta.build.params = self.params.iter().cloned().collect();

        meta.stage.name = self.stage_name.clone().unwrap_or_default();
        if let Some(number) = self.stage_number {
            meta.stage.number = number;
        }
        set(&mut meta.stage.machine, &self.machine);
        set(&mut meta.system.host, &self.system_host);
        set(&mut meta.system.proto, &self.system_proto);
        meta
    }
}

/// Compiler inputs shared by `exec`, `compile` and `graph`
#[derive(Args, Debug, Clone, Default)]
pub struct CompileFlags {
    /// Run the clone step
    #[clap(long)]
    pub clone: bool,

    /// Secret values
    #[clap(long = "secrets", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    pub secrets: Vec<(String, String)>,

    /// Global environment variables
    #[clap(long = "environ", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub environ: Vec<(String, String)>,

    /// Pod labels
    #[clap(long = "labels", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub labels: Vec<(String, String)>,

    /// Host volumes mounted into every step
    #[clap(long = "volumes", value_name = "HOST=CONTAINER", value_parser = parse_key_val)]
    pub volumes: Vec<(String, String)>,

    /// Additional privileged plugin images
    #[clap(long = "privileged", value_name = "IMAGE")]
    pub privileged: Vec<String>,

    /// Memory limit in MiB for containers
    #[clap(long)]
    pub limit_memory: Option<i64>,

    /// CPU limit in millicores for containers
    #[clap(long)]
    pub limit_cpu: Option<i64>,

    /// GPU limit for containers
    #[clap(long)]
    pub limit_gpu: Option<i64>,

    /// Memory in MiB for the entire pod [default: 100]
    #[clap(long)]
    pub request_memory: Option<i64>,

    /// CPU in millicores for the entire pod [default: 100]
    #[clap(long)]
    pub request_cpu: Option<i64>,

    /// Minimum memory in MiB allocated to each container [default: 4]
    #[clap(long)]
    pub min_request_memory: Option<i64>,

    /// Minimum CPU in millicores allocated to each container [default: 1]
    #[clap(long)]
    pub min_request_cpu: Option<i64>,

    /// Path to the pipeline policy file
    #[clap(long, value_name = "FILE")]
    pub policy: Option<PathBuf>,

    /// Default namespace [default: default]
    #[clap(long)]
    pub namespace: Option<String>,

    /// Enable remote debug sessions for debug builds
    #[clap(long)]
    pub tmate_enabled: bool,

    /// Remote debug session image
    #[clap(long)]
    pub tmate_image: Option<String>,

    /// Remote debug server host
    #[clap(long)]
    pub tmate_server_host: Option<String>,

    /// Remote debug server port
    #[clap(long)]
    pub tmate_server_port: Option<String>,

    /// Remote debug server RSA fingerprint
    #[clap(long)]
    pub tmate_server_rsa_fingerprint: Option<String>,

    /// Remote debug server ed25519 fingerprint
    #[clap(long)]
    pub tmate_server_ed25519_fingerprint: Option<String>,
}

const DEFAULT_STAGE_REQUESTS: ResourceConfig = ResourceConfig {
    cpu: Some(100),
    memory: Some(100),
    gpu: None,
};

const DEFAULT_MIN_REQUESTS: ResourceConfig = ResourceConfig {
    cpu: Some(1),
    memory: Some(4),
    gpu: None,
};

impl CompileFlags {
    /// Build the compiler, flags over file configuration over defaults
    pub fn compiler(&self, config: &RunnerConfig) -> Result<Compiler, PodrunError> {
        let merge = |file: &BTreeMap<String, String>, flags: &[(String, String)]| {
            let mut map = file.clone();
            map.extend(flags.iter().cloned());
            map
        };

        let limits = ResourceConfig {
            cpu: self.limit_cpu,
            memory: self.limit_memory,
            gpu: self.limit_gpu,
        }
        .or(config.limits);
        let min_requests = ResourceConfig {
            cpu: self.min_request_cpu,
            memory: self.min_request_memory,
            gpu: None,
        }
        .or(config.min_requests)
        .or(DEFAULT_MIN_REQUESTS);
        let stage_requests = ResourceConfig {
            cpu: self.request_cpu,
            memory: self.request_memory,
            gpu: None,
        }
        .or(config.requests)
        .or(DEFAULT_STAGE_REQUESTS);

        let policies = match self.policy.as_ref().or(config.policy.as_ref()) {
            Some(path) => {
                let policies = resource::policy::parse_file(path)?;
                debug!(path = %path.display(), count = policies.len(), "policies loaded");
                policies
            }
            None => Vec::new(),
        };

        let mut privileged: Vec<String> = self
            .privileged
            .iter()
            .chain(&config.privileged)
            .cloned()
            .collect();
        privileged.extend(DEFAULT_PRIVILEGED.iter().map(|s| s.to_string()));

        let file = &config.tmate;
        let tmate = Tmate {
            enabled: self.tmate_enabled || file.enabled.unwrap_or(false),
            image: self
                .tmate_image
                .clone()
                .or_else(|| file.image.clone())
                .unwrap_or_else(|| DEFAULT_TMATE_IMAGE.to_string()),
            server: self
                .tmate_server_host
                .clone()
                .or_else(|| file.server.clone())
                .unwrap_or_default(),
            port: self
                .tmate_server_port
                .clone()
                .or_else(|| file.port.clone())
                .unwrap_or_default(),
            rsa: self
                .tmate_server_rsa_fingerprint
                .clone()
                .or_else(|| file.rsa.clone())
                .unwrap_or_default(),
            ed25519: self
                .tmate_server_ed25519_fingerprint
                .clone()
                .or_else(|| file.ed25519.clone())
                .unwrap_or_default(),
        };

        Ok(Compiler {
            environ: merge(&config.environ, &self.environ),
            secrets: Arc::new(StaticSecrets::new(self.secrets.iter().cloned().collect())),
            resources: Resources {
                limits: limits.to_object(),
                requests: min_requests.to_object(),
            },
            stage_requests: stage_requests.to_object(),
            namespace: self
                .namespace
                .clone()
                .or_else(|| config.namespace.clone())
                .unwrap_or_else(|| "default".to_string()),
            privileged,
            labels: merge(&config.labels, &self.labels),
            volumes: merge(&config.volumes, &self.volumes),
            tmate,
            policies,
            clone_enabled: self.clone || config.clone.unwrap_or(false),
        })
    }
}

/// Read, substitute, parse and select the pipeline to run.
///
/// The stage name in `meta` is filled in from the selected pipeline when
/// it was left empty.
pub fn load_pipeline(
    source: &Path,
    meta: &mut RunMetadata,
    environ: &BTreeMap<String, String>,
) -> Result<Pipeline, PodrunError> {
    let raw = std::fs::read_to_string(source).map_err(|e| PodrunError::file_read(source, e))?;

    let mut env = environ.clone();
    env.extend(meta.environ());
    let text = substitute::eval_map(&raw, &env)?;

    let manifest = Manifest::parse(&text)?;
    let pipeline = manifest.lookup(&meta.stage.name)?.clone();
    if meta.stage.name.is_empty() {
        meta.stage.name = pipeline.name.clone();
    }

    debug!(
        source = %source.display(),
        pipeline = %pipeline.name,
        steps = pipeline.steps.len(),
        "pipeline loaded"
    );
    Ok(pipeline)
}
