// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Secret lookup

use std::collections::BTreeMap;

use crate::engine::Secret;

/// Source of named secrets
pub trait SecretProvider: Send + Sync {
    /// Look up a secret by name
    fn find(&self, name: &str) -> Option<Secret>;
}

/// Secrets supplied up front, e.g. from `--secrets name=value`
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

impl SecretProvider for StaticSecrets {
    fn find(&self, name: &str) -> Option<Secret> {
        self.values.get(name).map(|data| Secret {
            name: name.to_string(),
            data: data.clone(),
            mask: true,
        })
    }
}
