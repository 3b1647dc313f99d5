// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Variable substitution over raw manifest text
//!
//! Supports `$NAME`, `${NAME}`, `${NAME:-default}`, `${NAME=default}` and
//! `$$` as an escaped dollar sign.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::errors::PodrunError;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\$|\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("substitution pattern is valid")
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Expand variables in `text` using `lookup`
pub fn eval<F>(text: &str, lookup: F) -> Result<String, PodrunError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(pos) = text.rfind("${") {
        if !text[pos..].contains('}') {
            return Err(PodrunError::Substitution {
                message: format!("unterminated expression at offset {}", pos),
            });
        }
    }

    let mut error = None;
    let expanded = pattern().replace_all(text, |caps: &Captures| {
        if let Some(name) = caps.get(2) {
            return lookup(name.as_str()).unwrap_or_default();
        }
        let Some(body) = caps.get(1) else {
            return "$".to_string();
        };
        let body = body.as_str();

        // `:-` also replaces an empty value, `=` only an unset one
        let (name, default, or_empty) = match body.find(":-").or_else(|| body.find('=')) {
            Some(idx) if body[idx..].starts_with(":-") => {
                (&body[..idx], Some(&body[idx + 2..]), true)
            }
            Some(idx) => (&body[..idx], Some(&body[idx + 1..]), false),
            None => (body, None, false),
        };

        if !is_identifier(name) {
            error.get_or_insert_with(|| format!("invalid variable name '{}'", name));
            return String::new();
        }

        match (lookup(name), default) {
            (Some(value), Some(default)) if value.is_empty() && or_empty => default.to_string(),
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => String::new(),
        }
    });

    match error {
        Some(message) => Err(PodrunError::Substitution { message }),
        None => Ok(expanded.into_owned()),
    }
}

/// Expand variables from a map, quoting multi-line values so the YAML
/// document stays well formed
pub fn eval_map(text: &str, env: &BTreeMap<String, String>) -> Result<String, PodrunError> {
    eval(text, |name| {
        env.get(name).map(|v| {
            if v.contains('\n') {
                format!("{:?}", v)
            } else {
                v.clone()
            }
        })
    })
}
