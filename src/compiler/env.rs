// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Environment resolution
//!
//! Layers are merged in a fixed order, later layers overriding earlier
//! ones: global, build, pipeline, step, then plugin settings.

use std::collections::BTreeMap;

use crate::engine::SecretVar;
use crate::manifest::{scalar_to_string, Parameter, Variable};

/// Variables reserved for the runner
pub const RESTRICTED_VARS: &[&str] = &[
    "XDG_RUNTIME_DIR",
    "DOCKER_OPTS",
    "DOCKER_HOST",
    "PATH",
    "HOME",
];

/// First restricted variable declared in `env`, if any
pub fn find_restricted(env: &BTreeMap<String, Option<Variable>>) -> Option<&'static str> {
    RESTRICTED_VARS
        .iter()
        .copied()
        .find(|name| env.contains_key(*name))
}

/// Literal bindings; secret references and null bindings are dropped
pub fn static_env(src: &BTreeMap<String, Option<Variable>>) -> BTreeMap<String, String> {
    src.iter()
        .filter_map(|(k, v)| match v {
            Some(Variable::Value(value)) => Some((k.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

/// Secret references; literals and null bindings are dropped
pub fn secret_env(src: &BTreeMap<String, Option<Variable>>) -> Vec<SecretVar> {
    src.iter()
        .filter_map(|(k, v)| match v {
            Some(Variable::Secret(name)) if !name.trim().is_empty() => Some(SecretVar {
                name: name.clone(),
                env: k.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// `PLUGIN_*` variable name for a setting key
pub fn plugin_key(key: &str) -> String {
    let mut name = String::from("PLUGIN_");
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

fn setting_value(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Sequence(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => scalar_to_string(other),
    }
}

fn is_scalar(value: &serde_yaml::Value) -> bool {
    matches!(
        value,
        serde_yaml::Value::Null
            | serde_yaml::Value::Bool(_)
            | serde_yaml::Value::Number(_)
            | serde_yaml::Value::String(_)
    )
}

/// Convert plugin settings into literal and secret-backed variables
pub fn settings_env(
    settings: &BTreeMap<String, Option<Parameter>>,
) -> (BTreeMap<String, String>, Vec<SecretVar>) {
    let mut envs = BTreeMap::new();
    let mut secrets = Vec::new();

    for (key, param) in settings {
        match param {
            Some(Parameter::Value(value)) => {
                envs.insert(plugin_key(key), setting_value(value));
            }
            Some(Parameter::Secret(name)) => secrets.push(SecretVar {
                name: name.clone(),
                env: plugin_key(key),
            }),
            None => {}
        }
    }

    (envs, secrets)
}

/// Layered environment builder
///
/// A literal in a later layer replaces a secret reference to the same
/// variable from an earlier layer and vice versa.
#[derive(Debug, Default)]
pub struct Environ {
    envs: BTreeMap<String, String>,
    secrets: BTreeMap<String, SecretVar>,
}

impl Environ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a layer of literal values
    pub fn literals(&mut self, layer: &BTreeMap<String, String>) -> &mut Self {
        for (k, v) in layer {
            self.secrets.remove(k);
            self.envs.insert(k.clone(), v.clone());
        }
        self
    }

    /// Apply a layer of secret references
    pub fn secrets(&mut self, vars: Vec<SecretVar>) -> &mut Self {
        for var in vars {
            self.envs.remove(&var.env);
            self.secrets.insert(var.env.clone(), var);
        }
        self
    }

    /// Apply a declared `environment` block
    pub fn declared(&mut self, env: &BTreeMap<String, Option<Variable>>) -> &mut Self {
        self.literals(&static_env(env));
        self.secrets(secret_env(env))
    }

    /// Apply plugin settings
    pub fn settings(&mut self, settings: &BTreeMap<String, Option<Parameter>>) -> &mut Self {
        let (envs, secrets) = settings_env(settings);
        self.literals(&envs);
        self.secrets(secrets)
    }

    /// Literal environment and secret references, both ordered by variable
    pub fn finish(self) -> (BTreeMap<String, String>, Vec<SecretVar>) {
        (self.envs, self.secrets.into_values().collect())
    }
}
