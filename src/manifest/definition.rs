// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Pipeline definition structures
//!
//! Defines the schema of a `kind: pipeline` / `type: kubernetes` document.

use glob::Pattern;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::metadata::RunMetadata;
use crate::resource::Resources;

/// A pipeline resource from the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default = "default_type", rename = "type")]
    pub pipeline_type: String,

    /// Pipeline name
    #[serde(default)]
    pub name: String,

    /// Source checkout settings
    #[serde(default)]
    pub clone: CloneSettings,

    /// Pipeline-wide environment variables
    #[serde(default)]
    pub environment: BTreeMap<String, Option<Variable>>,

    /// Steps in declared order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Long-running services, started detached before the steps
    #[serde(default)]
    pub services: Vec<Step>,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, rename = "service_account_name")]
    pub service_account: Option<String>,

    /// Default container limits and stage requests
    #[serde(default)]
    pub resources: Resources,

    #[serde(default)]
    pub workspace: Workspace,

    #[serde(default)]
    pub volumes: Vec<Volume>,
}

fn default_kind() -> String {
    "pipeline".to_string()
}

fn default_type() -> String {
    "kubernetes".to_string()
}

impl Pipeline {
    /// Whether the pipeline targets the kubernetes runner
    pub fn is_kubernetes(&self) -> bool {
        self.kind.eq_ignore_ascii_case("pipeline")
            && self.pipeline_type.eq_ignore_ascii_case("kubernetes")
    }
}

/// Clone configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneSettings {
    #[serde(default)]
    pub disable: bool,

    #[serde(default)]
    pub depth: Option<u32>,

    #[serde(default)]
    pub skip_verify: bool,
}

/// Pod metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Workspace configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub path: Option<String>,
}

/// A pipeline volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,

    #[serde(default)]
    pub host: Option<HostPath>,

    #[serde(default)]
    pub temp: Option<serde_yaml::Value>,
}

/// Host path volume source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPath {
    pub path: String,
}

/// A volume mounted into a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub path: String,
}

/// A single pipeline step as authored
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    /// Step name (must be unique within pipeline)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub image: String,

    /// Pull policy: always, if-not-exists or never
    #[serde(default)]
    pub pull: String,

    /// Shell commands, rendered into a script
    #[serde(default)]
    pub commands: Vec<String>,

    #[serde(default)]
    pub entrypoint: Vec<String>,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, Option<Variable>>,

    /// Plugin settings, exported as `PLUGIN_*` variables
    #[serde(default)]
    pub settings: BTreeMap<String, Option<Parameter>>,

    #[serde(default)]
    pub privileged: bool,

    #[serde(default)]
    pub detach: bool,

    /// `ignore` lets the pipeline pass when this step fails
    #[serde(default)]
    pub failure: String,

    #[serde(default)]
    pub resources: Resources,

    #[serde(default)]
    pub when: Conditions,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
}

impl Step {
    /// Whether a failure of this step is ignored
    pub fn ignores_failure(&self) -> bool {
        self.failure.eq_ignore_ascii_case("ignore")
    }
}

/// An environment variable binding: a literal or a secret reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Variable {
    Value(String),
    Secret(String),
}

impl<'de> Deserialize<'de> for Variable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Parameter::deserialize(deserializer)? {
            Parameter::Secret(name) => Ok(Variable::Secret(name)),
            Parameter::Value(value) => Ok(Variable::Value(scalar_to_string(&value))),
        }
    }
}

/// A plugin setting: any YAML value or a secret reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Parameter {
    Value(serde_yaml::Value),
    Secret(String),
}

impl<'de> Deserialize<'de> for Parameter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        if let serde_yaml::Value::Mapping(map) = &value {
            if map.len() == 1 {
                if let Some(secret) = map.get("from_secret") {
                    let name = scalar_to_string(secret);
                    // a blank secret name degrades to an empty literal
                    if name.trim().is_empty() {
                        return Ok(Parameter::Value(serde_yaml::Value::String(String::new())));
                    }
                    return Ok(Parameter::Secret(name));
                }
            }
        }
        Ok(Parameter::Value(value))
    }
}

/// Render a YAML scalar the way it would be written in an env file
pub fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// `when` conditions of a step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub status: Condition,
    #[serde(default)]
    pub branch: Condition,
    #[serde(default)]
    pub event: Condition,
    #[serde(default, rename = "ref")]
    pub reference: Condition,
    #[serde(default)]
    pub repo: Condition,
    #[serde(default)]
    pub target: Condition,
    #[serde(default)]
    pub cron: Condition,
    #[serde(default)]
    pub action: Condition,
    #[serde(default)]
    pub instance: Condition,
}

impl Conditions {
    /// Check every non-status condition against the run
    pub fn matches_run(&self, meta: &RunMetadata) -> bool {
        self.branch.matches(&meta.build.branch)
            && self.event.matches(&meta.build.event)
            && self.reference.matches(&meta.build.reference)
            && self.repo.matches(&meta.repo.slug)
            && self.target.matches(&meta.build.target)
            && self.cron.matches(&meta.build.cron)
            && self.action.matches(&meta.build.action)
            && self.instance.matches(&meta.system.host)
    }
}

/// Include/exclude glob lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
            Full {
                #[serde(default)]
                include: Vec<String>,
                #[serde(default)]
                exclude: Vec<String>,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => Condition {
                include: vec![s],
                exclude: vec![],
            },
            Raw::Many(include) => Condition {
                include,
                exclude: vec![],
            },
            Raw::Full { include, exclude } => Condition { include, exclude },
        })
    }
}

impl Condition {
    /// Create a condition from include and exclude lists
    pub fn new<S: Into<String>>(
        include: impl IntoIterator<Item = S>,
        exclude: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether neither list carries a pattern
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn includes(&self, value: &str) -> bool {
        self.include.iter().any(|p| glob_match(p, value))
    }

    pub fn excludes(&self, value: &str) -> bool {
        self.exclude.iter().any(|p| glob_match(p, value))
    }

    /// Exclusion beats inclusion; an empty include list accepts anything
    pub fn matches(&self, value: &str) -> bool {
        if self.excludes(value) {
            return false;
        }
        if self.includes(value) {
            return true;
        }
        self.include.is_empty()
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(value),
        Err(_) => pattern == value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_forms() {
        let c: Condition = serde_yaml::from_str("failure").unwrap();
        assert_eq!(c.include, vec!["failure"]);

        let c: Condition = serde_yaml::from_str("[success, failure]").unwrap();
        assert_eq!(c.include.len(), 2);

        let c: Condition = serde_yaml::from_str("exclude: [success]").unwrap();
        assert!(c.include.is_empty());
        assert_eq!(c.exclude, vec!["success"]);
    }

    #[test]
    fn test_condition_matching() {
        let c = Condition::new(["feature/*"], ["feature/wip"]);
        assert!(c.matches("feature/login"));
        assert!(!c.matches("feature/wip"));
        assert!(!c.matches("main"));

        let only_exclude = Condition::new(Vec::<String>::new(), vec!["success".into()]);
        assert!(only_exclude.matches("failure"));
        assert!(!only_exclude.matches("success"));

        assert!(Condition::default().matches("anything"));
    }

    #[test]
    fn test_variable_forms() {
        let yaml = r#"
PLAIN: hello
NUMBER: 42
FLAG: true
TOKEN:
  from_secret: github_token
EMPTY:
"#;
        let env: BTreeMap<String, Option<Variable>> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(env["PLAIN"], Some(Variable::Value("hello".into())));
        assert_eq!(env["NUMBER"], Some(Variable::Value("42".into())));
        assert_eq!(env["FLAG"], Some(Variable::Value("true".into())));
        assert_eq!(env["TOKEN"], Some(Variable::Secret("github_token".into())));
        assert_eq!(env["EMPTY"], None);
    }

    #[test]
    fn test_run_conditions() {
        let when: Conditions = serde_yaml::from_str("branch: [main]\nevent: [push, tag]\n").unwrap();
        let mut meta = RunMetadata::default();
        meta.build.branch = "main".into();
        meta.build.event = "push".into();
        assert!(when.matches_run(&meta));

        meta.build.event = "pull_request".into();
        assert!(!when.matches_run(&meta));
    }

    #[test]
    fn test_parse_step() {
        let yaml = r#"
name: test
image: golang:1.22
pull: if-not-exists
commands:
  - go test ./...
failure: ignore
resources:
  limits:
    cpu: 1000
    memory: 512MiB
depends_on: [build]
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.name, "test");
        assert!(step.ignores_failure());
        assert_eq!(step.resources.limits.cpu, 1000);
        assert_eq!(step.resources.limits.memory, 512 * 1024 * 1024);
        assert_eq!(step.depends_on, vec!["build"]);
    }
}
