// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Repository, build and stage metadata
//!
//! Describes the run being executed. The compiler derives `DRONE_*`
//! variables and condition matching from it, the linter reads the trust
//! flag, and the state model copies identifiers from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Repository being built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    /// `namespace/name`
    pub slug: String,
    #[serde(default)]
    pub http_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub private: bool,
    /// Trusted repositories may use privileged mode and host volumes
    #[serde(default)]
    pub trusted: bool,
    /// Pipeline timeout in minutes
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Repo {
    fn default() -> Self {
        Self {
            slug: "local/repo".into(),
            http_url: String::new(),
            branch: default_branch(),
            private: false,
            trusted: false,
            timeout: default_timeout(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_timeout() -> u64 {
    60
}

impl Repo {
    /// Repository namespace (owner)
    pub fn namespace(&self) -> &str {
        self.slug.split_once('/').map(|(ns, _)| ns).unwrap_or("")
    }

    /// Repository name without namespace
    pub fn name(&self) -> &str {
        self.slug
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.slug)
    }
}

/// Build being executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub number: i64,
    #[serde(default = "default_event")]
    pub event: String,
    #[serde(default)]
    pub action: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default, rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: String,
    /// Deployment target
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub cron: String,
    /// Debug builds receive remote session variables when tmate is enabled
    #[serde(default)]
    pub debug: bool,
    /// Custom parameters, exported as-is
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Default for Build {
    fn default() -> Self {
        Self {
            number: 1,
            event: default_event(),
            action: String::new(),
            branch: default_branch(),
            reference: "refs/heads/main".into(),
            commit: String::new(),
            message: String::new(),
            author: String::new(),
            target: String::new(),
            cron: String::new(),
            debug: false,
            params: BTreeMap::new(),
        }
    }
}

fn default_event() -> String {
    "push".to_string()
}

/// Stage (one pipeline) within the build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInfo {
    pub number: i64,
    pub name: String,
    /// Runner host name
    #[serde(default)]
    pub machine: String,
}

impl Default for StageInfo {
    fn default() -> Self {
        Self {
            number: 1,
            name: "default".into(),
            machine: String::new(),
        }
    }
}

/// Server the run reports to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub proto: String,
    pub host: String,
}

impl Default for System {
    fn default() -> Self {
        Self {
            proto: "http".into(),
            host: "localhost".into(),
        }
    }
}

/// Everything the compiler needs to know about the run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub repo: Repo,
    pub build: Build,
    pub stage: StageInfo,
    pub system: System,
}

impl RunMetadata {
    /// Link to the build in the server UI
    pub fn build_link(&self) -> String {
        format!(
            "{}://{}/{}/{}",
            self.system.proto, self.system.host, self.repo.slug, self.build.number
        )
    }

    /// `DRONE_*` variables describing the run; build params are applied last
    pub fn environ(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let mut set = |k: &str, v: String| {
            env.insert(k.to_string(), v);
        };

        set("CI", "true".into());
        set("DRONE", "true".into());
        set("DRONE_SYSTEM_PROTO", self.system.proto.clone());
        set("DRONE_SYSTEM_HOST", self.system.host.clone());
        set("DRONE_REPO", self.repo.slug.clone());
        set("DRONE_REPO_NAMESPACE", self.repo.namespace().to_string());
        set("DRONE_REPO_NAME", self.repo.name().to_string());
        set("DRONE_REPO_BRANCH", self.repo.branch.clone());
        set("DRONE_REPO_PRIVATE", self.repo.private.to_string());
        set("DRONE_REMOTE_URL", self.repo.http_url.clone());
        set("DRONE_GIT_HTTP_URL", self.repo.http_url.clone());
        set("DRONE_BUILD_NUMBER", self.build.number.to_string());
        set("DRONE_BUILD_EVENT", self.build.event.clone());
        set("DRONE_BUILD_ACTION", self.build.action.clone());
        set("DRONE_BUILD_LINK", self.build_link());
        set("DRONE_BRANCH", self.build.branch.clone());
        set("DRONE_COMMIT", self.build.commit.clone());
        set("DRONE_COMMIT_SHA", self.build.commit.clone());
        set("DRONE_COMMIT_BRANCH", self.build.branch.clone());
        set("DRONE_COMMIT_REF", self.build.reference.clone());
        set("DRONE_COMMIT_MESSAGE", self.build.message.clone());
        set("DRONE_COMMIT_AUTHOR", self.build.author.clone());
        set("DRONE_DEPLOY_TO", self.build.target.clone());
        set("DRONE_CRON", self.build.cron.clone());
        set("DRONE_STAGE_NAME", self.stage.name.clone());
        set("DRONE_STAGE_NUMBER", self.stage.number.to_string());
        set("DRONE_STAGE_MACHINE", self.stage.machine.clone());

        env.extend(self.build.params.clone());
        env
    }
}
