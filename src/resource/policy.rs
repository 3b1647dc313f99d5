// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Per-repository override policies
//!
//! A policy file is a multi-document YAML stream. Each document is one
//! policy; the first policy whose matcher accepts the repository and
//! pipeline wins.

use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::ResourceObject;
use crate::errors::PodrunError;

/// An override policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name, used in logs
    #[serde(default)]
    pub name: String,

    /// Which repositories and pipelines the policy applies to
    #[serde(default, rename = "match")]
    pub matcher: PolicyMatch,

    /// Namespace override for the pod
    #[serde(default)]
    pub namespace: Option<String>,

    /// Labels added to the pod
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Annotations added to the pod
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Node selector applied to the pod
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Service account override
    #[serde(default)]
    pub service_account: Option<String>,

    /// Resource overrides
    #[serde(default)]
    pub resources: PolicyResources,
}

/// Repository and pipeline glob matchers; an empty list matches anything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyMatch {
    #[serde(default)]
    pub repo: Vec<String>,

    #[serde(default)]
    pub pipeline: Vec<String>,
}

/// Resource overrides carried by a policy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PolicyResources {
    /// Replaces each non-zero container limit
    #[serde(default, alias = "limit")]
    pub limits: ResourceObject,

    /// Replaces each non-zero minimum container request
    #[serde(default, alias = "request")]
    pub requests: ResourceObject,
}

impl PolicyMatch {
    /// Check whether the matcher accepts a repository slug and pipeline name
    pub fn matches(&self, repo: &str, pipeline: &str) -> bool {
        matches_any(&self.repo, repo) && matches_any(&self.pipeline, pipeline)
    }
}

fn matches_any(patterns: &[String], value: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| match Pattern::new(p) {
        Ok(pattern) => pattern.matches(value),
        Err(_) => p == value,
    })
}

/// Parse a policy document stream
pub fn parse(content: &str, path: &Path) -> Result<Vec<Policy>, PodrunError> {
    let mut policies = Vec::new();

    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| PodrunError::Policy {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }
        let policy: Policy = serde_yaml::from_value(value).map_err(|e| PodrunError::Policy {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        for pattern in policy.matcher.repo.iter().chain(&policy.matcher.pipeline) {
            Pattern::new(pattern).map_err(|e| PodrunError::Policy {
                path: path.to_path_buf(),
                message: format!("policy '{}': {}", policy.name, e),
            })?;
        }
        policies.push(policy);
    }

    Ok(policies)
}

/// Load policies from a file
pub fn parse_file(path: &Path) -> Result<Vec<Policy>, PodrunError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| PodrunError::file_read(path, e))?;
    parse(&content, path)
}

/// Return the first policy that applies to the repository and pipeline
pub fn select<'a>(policies: &'a [Policy], repo: &str, pipeline: &str) -> Option<&'a Policy> {
    policies.iter().find(|p| p.matcher.matches(repo, pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MIB;

    const POLICIES: &str = r#"
name: gpu
match:
  repo: ["octocat/ml-*"]
resources:
  limits:
    gpu: 1
    memory: 2GiB
---
name: default
namespace: ci
resources:
  requests:
    cpu: 50
"#;

    #[test]
    fn test_parse_multi_document() {
        let policies = parse(POLICIES, Path::new("policy.yml")).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].resources.limits.memory, 2048 * MIB);
        assert_eq!(policies[1].namespace.as_deref(), Some("ci"));
    }

    #[test]
    fn test_first_match_wins() {
        let policies = parse(POLICIES, Path::new("policy.yml")).unwrap();

        let selected = select(&policies, "octocat/ml-train", "default").unwrap();
        assert_eq!(selected.name, "gpu");

        let selected = select(&policies, "octocat/hello-world", "default").unwrap();
        assert_eq!(selected.name, "default");
    }

    #[test]
    fn test_pipeline_matcher() {
        let matcher = PolicyMatch {
            repo: vec![],
            pipeline: vec!["deploy-*".into()],
        };
        assert!(matcher.matches("any/repo", "deploy-prod"));
        assert!(!matcher.matches("any/repo", "test"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let content = "name: broken\nmatch:\n  repo: [\"[oops\"]\n";
        let result = parse(content, Path::new("policy.yml"));
        assert!(matches!(result, Err(PodrunError::Policy { .. })));
    }
}
