// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Compiled pipeline specification
//!
//! The executable form produced by the compiler and consumed by the
//! driver and the backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::{ResourceObject, Resources};

/// Image pull policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Left to the backend
    #[default]
    Default,
    Always,
    IfNotExists,
    Never,
}

impl PullPolicy {
    /// Normalise a manifest pull string; anything unknown is the default
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "always" => Self::Always,
            "if-not-exists" => Self::IfNotExists,
            "never" => Self::Never,
            _ => Self::Default,
        }
    }
}

/// When a step runs relative to the aggregate status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPolicy {
    #[default]
    OnSuccess,
    OnFailure,
    Always,
    Never,
}

impl std::fmt::Display for RunPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnSuccess => write!(f, "on-success"),
            Self::OnFailure => write!(f, "on-failure"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// How a step failure affects the aggregate status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrPolicy {
    #[default]
    Fail,
    Ignore,
}

/// Environment variable sourced from a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVar {
    /// Secret name
    pub name: String,
    /// Target environment variable
    pub env: String,
}

/// A resolved secret value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    #[serde(skip_serializing, default)]
    pub data: String,
    /// Whether the value must be masked in logs
    pub mask: bool,
}

/// Pod volume source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSource {
    HostPath { path: String },
    EmptyDir,
}

/// A pod volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

/// A volume mounted into a step container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub path: String,
}

/// Remote debug session settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tmate {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub rsa: String,
    #[serde(default)]
    pub ed25519: String,
}

/// Pod-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub node_selector: BTreeMap<String, String>,
    pub service_account: Option<String>,
}

/// A compiled, executable step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub image: String,
    pub pull_policy: PullPolicy,
    pub entrypoint: Vec<String>,
    pub command: Vec<String>,
    /// Literal environment; secret-derived variables live in `secrets`
    pub envs: BTreeMap<String, String>,
    pub secrets: Vec<SecretVar>,
    pub resources: Resources,
    pub privileged: bool,
    pub detach: bool,
    pub run_policy: RunPolicy,
    pub err_policy: ErrPolicy,
    pub depends_on: Vec<String>,
    pub working_dir: String,
    pub volumes: Vec<VolumeMount>,
}

impl Step {
    /// Whether a failure of this step is ignored
    pub fn ignores_error(&self) -> bool {
        self.err_policy == ErrPolicy::Ignore
    }
}

/// The executable graph for one stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Spec {
    pub pod: PodSpec,
    pub steps: Vec<Step>,
    /// Secrets referenced by steps, keyed by name
    pub secrets: BTreeMap<String, Secret>,
    pub volumes: Vec<Volume>,
    /// Resources requested for the whole pod
    pub stage_requests: ResourceObject,
    pub tmate: Tmate,
}

impl Spec {
    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Resolve the secret-derived environment of a step
    pub fn secret_environ(&self, step: &Step) -> BTreeMap<String, String> {
        step.secrets
            .iter()
            .filter_map(|var| {
                self.secrets
                    .get(&var.name)
                    .map(|secret| (var.env.clone(), secret.data.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_policy_normalisation() {
        assert_eq!(PullPolicy::parse("always"), PullPolicy::Always);
        assert_eq!(PullPolicy::parse("IF-NOT-EXISTS"), PullPolicy::IfNotExists);
        assert_eq!(PullPolicy::parse("never"), PullPolicy::Never);
        assert_eq!(PullPolicy::parse("sometimes"), PullPolicy::Default);
        assert_eq!(PullPolicy::parse(""), PullPolicy::Default);
    }

    #[test]
    fn test_secret_values_are_not_serialized() {
        let secret = Secret {
            name: "token".into(),
            data: "hunter2".into(),
            mask: true,
        };
        let json = serde_json::to_string(&secret).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_secret_environ() {
        let mut spec = Spec::default();
        spec.secrets.insert(
            "token".into(),
            Secret {
                name: "token".into(),
                data: "s3cr3t".into(),
                mask: true,
            },
        );
        let step = Step {
            secrets: vec![
                SecretVar { name: "token".into(), env: "GITHUB_TOKEN".into() },
                SecretVar { name: "missing".into(), env: "OTHER".into() },
            ],
            ..Step::default()
        };
        let env = spec.secret_environ(&step);
        assert_eq!(env.len(), 1);
        assert_eq!(env["GITHUB_TOKEN"], "s3cr3t");
    }
}
