// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Manifest parsing
//!
//! A manifest is a multi-document YAML stream. Only pipeline documents
//! are modelled; other kinds (secrets, signatures) are kept as opaque
//! entries so the document count stays accurate.

mod definition;
mod lint;
pub mod substitute;

pub use definition::*;
pub use lint::{LintReport, Linter};

use serde::Deserialize;

use crate::errors::PodrunError;

/// One document of a manifest
#[derive(Debug, Clone)]
pub enum Resource {
    Pipeline(Box<Pipeline>),
    Other { kind: String, name: String },
}

/// A parsed manifest
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub resources: Vec<Resource>,
}

impl Manifest {
    /// Parse a manifest from YAML text
    pub fn parse(content: &str) -> Result<Self, PodrunError> {
        let mut resources = Vec::new();

        for document in serde_yaml::Deserializer::from_str(content) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            let kind = value
                .get("kind")
                .and_then(|k| k.as_str())
                .unwrap_or("pipeline")
                .to_string();

            if kind.eq_ignore_ascii_case("pipeline") {
                let pipeline: Pipeline = serde_yaml::from_value(value)?;
                resources.push(Resource::Pipeline(Box::new(pipeline)));
            } else {
                let name = value
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                resources.push(Resource::Other { kind, name });
            }
        }

        if resources.is_empty() {
            return Err(PodrunError::Parse {
                message: "manifest contains no documents".into(),
            });
        }

        Ok(Self { resources })
    }

    /// All pipeline documents in order
    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.resources.iter().filter_map(|r| match r {
            Resource::Pipeline(p) => Some(p.as_ref()),
            Resource::Other { .. } => None,
        })
    }

    /// Find the kubernetes pipeline with the given name.
    ///
    /// An empty name selects the first kubernetes pipeline.
    pub fn lookup(&self, name: &str) -> Result<&Pipeline, PodrunError> {
        self.pipelines()
            .filter(|p| p.is_kubernetes())
            .find(|p| name.is_empty() || p.name == name)
            .ok_or_else(|| PodrunError::PipelineNotFound {
                name: name.to_string(),
            })
    }
}
