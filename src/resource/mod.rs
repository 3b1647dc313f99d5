// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Resource limits and requests
//!
//! CPU is measured in millicores, memory in bytes and GPUs in whole
//! units. A zero value always means "unset", never "no resources".

pub mod policy;

pub use policy::{Policy, PolicyMatch, PolicyResources};

use serde::{Deserialize, Deserializer, Serialize};

/// Bytes in one mebibyte
pub const MIB: i64 = 1024 * 1024;

/// A set of resource amounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceObject {
    /// CPU in millicores
    #[serde(default)]
    pub cpu: i64,

    /// Memory in bytes
    #[serde(default, deserialize_with = "deserialize_bytes")]
    pub memory: i64,

    /// GPU units
    #[serde(default)]
    pub gpu: i64,
}

impl ResourceObject {
    /// Build a resource object from a memory amount given in mebibytes
    pub fn from_megabytes(cpu: i64, memory_mb: i64, gpu: i64) -> Self {
        Self {
            cpu,
            memory: memory_mb * MIB,
            gpu,
        }
    }

    /// Field-wise first non-zero value across candidates in priority order
    pub fn first_non_zero(candidates: &[ResourceObject]) -> ResourceObject {
        ResourceObject {
            cpu: first_non_zero(candidates.iter().map(|r| r.cpu)),
            memory: first_non_zero(candidates.iter().map(|r| r.memory)),
            gpu: first_non_zero(candidates.iter().map(|r| r.gpu)),
        }
    }
}

/// Container limits plus the minimum request granted to each container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub limits: ResourceObject,

    #[serde(default)]
    pub requests: ResourceObject,
}

/// Returns the first strictly positive value, or zero
pub fn first_non_zero(values: impl IntoIterator<Item = i64>) -> i64 {
    values.into_iter().find(|v| *v > 0).unwrap_or(0)
}

/// Parse a memory amount such as `512Mi`, `1GiB`, `100MB` or `1024`.
pub fn parse_bytes(input: &str) -> Option<i64> {
    let s = input.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "k" | "kb" => 1e3,
        "m" | "mb" => 1e6,
        "g" | "gb" => 1e9,
        "t" | "tb" => 1e12,
        "ki" | "kib" => 1024.0,
        "mi" | "mib" => 1024.0 * 1024.0,
        "gi" | "gib" => 1024.0 * 1024.0 * 1024.0,
        "ti" | "tib" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some((number * multiplier) as i64)
}

fn deserialize_bytes<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Text(s) => parse_bytes(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid memory size '{}'", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_non_zero_priority() {
        assert_eq!(first_non_zero([0, 512, 256]), 512);
        assert_eq!(first_non_zero([128, 512, 256]), 128);
        assert_eq!(first_non_zero([0, 0, 0]), 0);
        assert_eq!(first_non_zero([-1, 0, 64]), 64);
    }

    #[test]
    fn test_field_wise_resolution() {
        let step = ResourceObject { cpu: 0, memory: 0, gpu: 1 };
        let pipeline = ResourceObject { cpu: 512, memory: 0, gpu: 0 };
        let global = ResourceObject { cpu: 256, memory: 64 * MIB, gpu: 2 };

        let resolved = ResourceObject::first_non_zero(&[step, pipeline, global]);
        assert_eq!(resolved.cpu, 512);
        assert_eq!(resolved.memory, 64 * MIB);
        assert_eq!(resolved.gpu, 1);
    }

    #[test]
    fn test_megabytes_are_converted_to_bytes() {
        let r = ResourceObject::from_megabytes(100, 4, 0);
        assert_eq!(r.memory, 4 * 1_048_576);
        assert_eq!(r.cpu, 100);
    }

    #[test]
    fn test_parse_bytes_units() {
        assert_eq!(parse_bytes("1024"), Some(1024));
        assert_eq!(parse_bytes("512Mi"), Some(512 * MIB));
        assert_eq!(parse_bytes("1GiB"), Some(1024 * MIB));
        assert_eq!(parse_bytes("100MB"), Some(100_000_000));
        assert_eq!(parse_bytes("lots"), None);
    }

    #[test]
    fn test_deserialize_memory_string() {
        let r: ResourceObject = serde_yaml::from_str("cpu: 500\nmemory: 256MiB\n").unwrap();
        assert_eq!(r.cpu, 500);
        assert_eq!(r.memory, 256 * MIB);
    }
}
