// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Runner configuration
//!
//! Optional TOML file with defaults for the `exec`, `compile` and `graph`
//! commands. Command-line flags always win over file values. Memory
//! amounts are given in MiB here and converted to bytes on use.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::PodrunError;
use crate::resource::ResourceObject;

/// File-level runner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    pub namespace: Option<String>,
    /// Maximum concurrently running steps
    pub procs: Option<usize>,
    pub clone: Option<bool>,
    /// Extra plugin images granted privileged mode
    pub privileged: Vec<String>,
    pub environ: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub volumes: BTreeMap<String, String>,
    pub policy: Option<PathBuf>,
    pub limits: ResourceConfig,
    /// Requests for the whole pod
    pub requests: ResourceConfig,
    /// Minimum requests for each container
    pub min_requests: ResourceConfig,
    pub engine: EngineConfig,
    pub tmate: TmateConfig,
    pub log: LogConfig,
}

/// Resource amounts; memory in MiB
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceConfig {
    pub cpu: Option<i64>,
    pub memory: Option<i64>,
    pub gpu: Option<i64>,
}

impl ResourceConfig {
    /// Fill unset fields from `fallback`
    pub fn or(self, fallback: ResourceConfig) -> Self {
        Self {
            cpu: self.cpu.or(fallback.cpu),
            memory: self.memory.or(fallback.memory),
            gpu: self.gpu.or(fallback.gpu),
        }
    }

    /// Convert to resources with memory in bytes
    pub fn to_object(self) -> ResourceObject {
        ResourceObject::from_megabytes(
            self.cpu.unwrap_or(0),
            self.memory.unwrap_or(0),
            self.gpu.unwrap_or(0),
        )
    }
}

/// Backend timing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Seconds to wait for a step to start
    pub container_start_timeout: Option<u64>,
    /// Seconds a cancelled step may take to stop
    pub kill_grace: Option<u64>,
}

/// Remote debug session defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TmateConfig {
    pub enabled: Option<bool>,
    pub image: Option<String>,
    pub server: Option<String>,
    pub port: Option<String>,
    pub rsa: Option<String>,
    pub ed25519: Option<String>,
}

/// Logging verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Warn,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: LogLevel,
}

impl LogConfig {
    /// Raise the configured level with `--debug` / `--trace`
    pub fn with_flags(self, debug: bool, trace: bool) -> Self {
        let flag = if trace {
            LogLevel::Trace
        } else if debug {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        };
        Self {
            level: self.level.max(flag),
        }
    }

    /// Filter directive for the subscriber
    pub fn directive(&self) -> String {
        format!("podrun={}", self.level.as_str())
    }
}

impl RunnerConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "podrun", "podrun")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, PodrunError> {
        toml::from_str(content).map_err(|e| PodrunError::Config {
            message: e.to_string(),
            help: Some("See README.md for the configuration file format".into()),
        })
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and an empty configuration otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, PodrunError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content =
            std::fs::read_to_string(&path).map_err(|e| PodrunError::file_read(&path, e))?;
        Self::parse(&content)
    }
}
