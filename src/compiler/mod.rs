// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Pipeline compiler
//!
//! Converts a declarative pipeline into the executable [`Spec`] consumed
//! by the runtime. Compilation is all-or-nothing and never talks to the
//! orchestration backend.

pub mod env;
pub mod filter;
pub mod graph;
pub mod run_policy;
pub mod secret;

pub use filter::StepFilter;
pub use graph::{StepGraph, CLONE_STEP};
pub use secret::{SecretProvider, StaticSecrets};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::engine::{
    ErrPolicy, PodSpec, PullPolicy, RunPolicy, Spec, Step, Tmate, Volume, VolumeMount,
    VolumeSource,
};
use crate::errors::PodrunError;
use crate::manifest::{self, Pipeline};
use crate::metadata::RunMetadata;
use crate::resource::{self, Policy, ResourceObject, Resources};

/// Plugin images granted privileged mode when they run without commands
pub const DEFAULT_PRIVILEGED: &[&str] = &[
    "plugins/docker",
    "plugins/acr",
    "plugins/ecr",
    "plugins/gcr",
    "plugins/heroku",
];

/// Image of the implicit checkout step
pub const CLONE_IMAGE: &str = "drone/git:latest";

/// Default image of the remote debug session helper
pub const DEFAULT_TMATE_IMAGE: &str = "drone/drone-runner-docker:latest";

const DEFAULT_WORKSPACE: &str = "/drone/src";

/// Compiler configuration, fixed for every pipeline it compiles
#[derive(Clone)]
pub struct Compiler {
    /// Global environment, the lowest layer
    pub environ: BTreeMap<String, String>,
    pub secrets: Arc<dyn SecretProvider>,
    /// Default container limits and minimum container requests
    pub resources: Resources,
    /// Default resources requested for the whole pod
    pub stage_requests: ResourceObject,
    pub namespace: String,
    /// Plugin images that run privileged
    pub privileged: Vec<String>,
    pub labels: BTreeMap<String, String>,
    /// Host path to container path, mounted into every step
    pub volumes: BTreeMap<String, String>,
    pub tmate: Tmate,
    pub policies: Vec<Policy>,
    /// Whether the checkout step runs
    pub clone_enabled: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            environ: BTreeMap::new(),
            secrets: Arc::new(StaticSecrets::default()),
            resources: Resources::default(),
            stage_requests: ResourceObject::default(),
            namespace: "default".into(),
            privileged: DEFAULT_PRIVILEGED.iter().map(|s| s.to_string()).collect(),
            labels: BTreeMap::new(),
            volumes: BTreeMap::new(),
            tmate: Tmate::default(),
            policies: Vec::new(),
            clone_enabled: false,
        }
    }
}

/// Per-run compiler input
pub struct CompilerArgs<'a> {
    pub pipeline: &'a Pipeline,
    pub meta: &'a RunMetadata,
}

/// Per-pipeline values shared by every step conversion
struct Frame<'a> {
    args: &'a CompilerArgs<'a>,
    policy: Option<&'a Policy>,
    base_env: BTreeMap<String, String>,
    min_requests: ResourceObject,
    workspace: String,
    global_mounts: Vec<VolumeMount>,
}

impl Compiler {
    /// Compile a pipeline into an executable spec
    pub fn compile(&self, args: &CompilerArgs<'_>) -> Result<Spec, PodrunError> {
        let pipeline = args.pipeline;
        let meta = args.meta;

        let policy = resource::policy::select(&self.policies, &meta.repo.slug, &pipeline.name);
        if let Some(policy) = policy {
            debug!(policy = %policy.name, pipeline = %pipeline.name, "policy matched");
        }

        let pod = self.pod_spec(pipeline, meta, policy);
        let workspace = pipeline
            .workspace
            .path
            .clone()
            .unwrap_or_else(|| DEFAULT_WORKSPACE.to_string());

        let (mut volumes, global_mounts) = self.pod_volumes(pipeline);

        let frame = Frame {
            args,
            policy,
            base_env: self.base_env(meta, &workspace),
            min_requests: ResourceObject::first_non_zero(&[
                policy.map(|p| p.resources.requests).unwrap_or_default(),
                self.resources.requests,
            ]),
            workspace,
            global_mounts,
        };

        let mut steps = Vec::new();
        if !pipeline.clone.disable {
            steps.push(self.clone_step(&frame, &pod));
        }
        for service in &pipeline.services {
            let mut step = self.compile_step(&frame, &pod, service, steps.len())?;
            step.detach = true;
            steps.push(step);
        }
        for src in &pipeline.steps {
            steps.push(self.compile_step(&frame, &pod, src, steps.len())?);
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name.as_str()) {
                return Err(PodrunError::InvalidStep {
                    step: step.name.clone(),
                    reason: "duplicate step name".into(),
                });
            }
        }

        graph::configure(&mut steps);
        StepGraph::build(&steps)?;

        let secrets = self.resolve_secrets(&steps);

        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        let spec = Spec {
            pod,
            steps,
            secrets,
            volumes,
            stage_requests: ResourceObject::first_non_zero(&[
                pipeline.resources.requests,
                self.stage_requests,
            ]),
            tmate: self.tmate.clone(),
        };

        debug!(
            pipeline = %pipeline.name,
            pod = %spec.pod.name,
            steps = spec.steps.len(),
            "pipeline compiled"
        );
        Ok(spec)
    }

    fn pod_spec(
        &self,
        pipeline: &Pipeline,
        meta: &RunMetadata,
        policy: Option<&Policy>,
    ) -> PodSpec {
        let mut pod = PodSpec {
            name: format!(
                "podrun-{}",
                short_id(&[
                    meta.repo.slug.as_str(),
                    meta.build.number.to_string().as_str(),
                    meta.stage.number.to_string().as_str(),
                    pipeline.name.as_str(),
                ])
            ),
            namespace: pipeline
                .metadata
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| self.namespace.clone()),
            labels: self.labels.clone(),
            annotations: pipeline.metadata.annotations.clone(),
            node_selector: pipeline.node_selector.clone(),
            service_account: pipeline.service_account.clone(),
        };
        pod.labels.extend(pipeline.metadata.labels.clone());

        if let Some(policy) = policy {
            if let Some(ns) = policy.namespace.as_ref().filter(|ns| !ns.is_empty()) {
                pod.namespace = ns.clone();
            }
            pod.labels.extend(policy.labels.clone());
            pod.annotations.extend(policy.annotations.clone());
            pod.node_selector.extend(policy.node_selector.clone());
            if policy.service_account.is_some() {
                pod.service_account = policy.service_account.clone();
            }
        }
        pod
    }

    fn pod_volumes(&self, pipeline: &Pipeline) -> (Vec<Volume>, Vec<VolumeMount>) {
        let mut volumes: Vec<Volume> = pipeline
            .volumes
            .iter()
            .map(|v| Volume {
                name: v.name.clone(),
                source: match &v.host {
                    Some(host) => VolumeSource::HostPath {
                        path: host.path.clone(),
                    },
                    None => VolumeSource::EmptyDir,
                },
            })
            .collect();

        let mut mounts = Vec::new();
        for (host, target) in &self.volumes {
            let name = format!("global-{}", short_id(&[host.as_str()]));
            volumes.push(Volume {
                name: name.clone(),
                source: VolumeSource::HostPath { path: host.clone() },
            });
            mounts.push(VolumeMount {
                name,
                path: target.clone(),
            });
        }
        (volumes, mounts)
    }

    /// Global and build layers, shared by every step
    fn base_env(&self, meta: &RunMetadata, workspace: &str) -> BTreeMap<String, String> {
        let mut environ = env::Environ::new();
        environ.literals(&self.environ).literals(&meta.environ());

        let mut runner = BTreeMap::from([("DRONE_WORKSPACE".to_string(), workspace.to_string())]);
        if self.tmate.enabled && meta.build.debug {
            runner.insert("DRONE_TMATE_HOST".into(), self.tmate.server.clone());
            runner.insert("DRONE_TMATE_PORT".into(), self.tmate.port.clone());
            runner.insert("DRONE_TMATE_FINGERPRINT_RSA".into(), self.tmate.rsa.clone());
            runner.insert(
                "DRONE_TMATE_FINGERPRINT_ED25519".into(),
                self.tmate.ed25519.clone(),
            );
        }
        environ.literals(&runner);
        environ.finish().0
    }

    fn clone_step(&self, frame: &Frame<'_>, pod: &PodSpec) -> Step {
        let clone = &frame.args.pipeline.clone;
        let mut envs = frame.base_env.clone();
        if let Some(depth) = clone.depth {
            envs.insert("PLUGIN_DEPTH".into(), depth.to_string());
        }
        if clone.skip_verify {
            envs.insert("GIT_SSL_NO_VERIFY".into(), "true".into());
            envs.insert("PLUGIN_SKIP_VERIFY".into(), "true".into());
        }
        envs.insert("DRONE_STEP_NAME".into(), CLONE_STEP.into());
        envs.insert("DRONE_STEP_NUMBER".into(), "1".into());

        Step {
            id: short_id(&[pod.name.as_str(), CLONE_STEP]),
            name: CLONE_STEP.into(),
            image: CLONE_IMAGE.into(),
            pull_policy: PullPolicy::IfNotExists,
            envs,
            resources: self.resolve_resources(frame, &Resources::default()),
            run_policy: if self.clone_enabled {
                RunPolicy::OnSuccess
            } else {
                RunPolicy::Never
            },
            working_dir: frame.workspace.clone(),
            volumes: frame.global_mounts.clone(),
            ..Step::default()
        }
    }

    fn compile_step(
        &self,
        frame: &Frame<'_>,
        pod: &PodSpec,
        src: &manifest::Step,
        position: usize,
    ) -> Result<Step, PodrunError> {
        let pipeline = frame.args.pipeline;

        let restricted = env::find_restricted(&src.environment)
            .or_else(|| env::find_restricted(&pipeline.environment));
        if let Some(variable) = restricted {
            return Err(PodrunError::RestrictedVariable {
                step: src.name.clone(),
                variable: variable.to_string(),
            });
        }

        let step_vars = BTreeMap::from([
            ("DRONE_STEP_NAME".to_string(), src.name.clone()),
            ("DRONE_STEP_NUMBER".to_string(), (position + 1).to_string()),
        ]);
        let mut environ = env::Environ::new();
        environ
            .literals(&frame.base_env)
            .literals(&step_vars)
            .declared(&pipeline.environment)
            .declared(&src.environment)
            .settings(&src.settings);
        let (envs, secrets) = environ.finish();

        let (entrypoint, command) = if src.commands.is_empty() {
            (src.entrypoint.clone(), src.command.clone())
        } else {
            (
                vec!["/bin/sh".to_string(), "-c".to_string()],
                vec![render_script(&src.commands)],
            )
        };

        let run_policy = if src.when.matches_run(frame.args.meta) {
            run_policy::resolve(&src.when.status)
        } else {
            debug!(step = %src.name, "conditions do not match the build");
            RunPolicy::Never
        };

        let privileged = src.privileged
            || (src.commands.is_empty()
                && src.entrypoint.is_empty()
                && src.command.is_empty()
                && self.is_privileged_image(&src.image));

        let mut volumes: Vec<VolumeMount> = src
            .volumes
            .iter()
            .map(|m| VolumeMount {
                name: m.name.clone(),
                path: m.path.clone(),
            })
            .collect();
        volumes.extend(frame.global_mounts.iter().cloned());

        let step = Step {
            id: short_id(&[pod.name.as_str(), src.name.as_str()]),
            name: src.name.clone(),
            image: src.image.clone(),
            pull_policy: PullPolicy::parse(&src.pull),
            entrypoint,
            command,
            envs,
            secrets,
            resources: self.resolve_resources(frame, &src.resources),
            privileged,
            detach: src.detach,
            run_policy,
            err_policy: if src.ignores_failure() {
                ErrPolicy::Ignore
            } else {
                ErrPolicy::Fail
            },
            depends_on: src.depends_on.clone(),
            working_dir: src
                .working_dir
                .clone()
                .unwrap_or_else(|| frame.workspace.clone()),
            volumes,
        };

        debug!(
            step = %step.name,
            run_policy = %step.run_policy,
            cpu = step.resources.limits.cpu,
            memory = step.resources.limits.memory,
            "step compiled"
        );
        Ok(step)
    }

    /// Limits: step, pipeline default, global default, then the policy
    /// override. Requests: step, then the minimum request.
    fn resolve_resources(&self, frame: &Frame<'_>, step: &Resources) -> Resources {
        let limits = ResourceObject::first_non_zero(&[
            step.limits,
            frame.args.pipeline.resources.limits,
            self.resources.limits,
        ]);
        let limits = match frame.policy {
            Some(policy) => ResourceObject::first_non_zero(&[policy.resources.limits, limits]),
            None => limits,
        };
        Resources {
            limits,
            requests: ResourceObject::first_non_zero(&[step.requests, frame.min_requests]),
        }
    }

    fn is_privileged_image(&self, image: &str) -> bool {
        let name = image_name(image);
        self.privileged.iter().any(|p| image_name(p) == name)
    }

    fn resolve_secrets(&self, steps: &[Step]) -> BTreeMap<String, crate::engine::Secret> {
        let mut resolved = BTreeMap::new();
        for var in steps.iter().flat_map(|s| &s.secrets) {
            if resolved.contains_key(&var.name) {
                continue;
            }
            match self.secrets.find(&var.name) {
                Some(secret) => {
                    resolved.insert(var.name.clone(), secret);
                }
                None => debug!(secret = %var.name, "secret not found"),
            }
        }
        resolved
    }
}

/// Render commands into a shell script that echoes each command first
fn render_script(commands: &[String]) -> String {
    let mut script = String::from("set -e\n");
    for command in commands {
        script.push_str(&format!("echo {}\n", shell_quote(&format!("+ {}", command))));
        script.push_str(command);
        script.push('\n');
    }
    script
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Image name without tag or digest
fn image_name(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    match image.rfind(':') {
        Some(i) if !image[i..].contains('/') => &image[..i],
        _ => image,
    }
}

/// Short deterministic identifier derived from the given parts
fn short_id(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex()[..20].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use crate::resource::MIB;

    fn pipeline(yaml: &str) -> Pipeline {
        Manifest::parse(yaml).unwrap().lookup("").unwrap().clone()
    }

    fn compile_with(compiler: &Compiler, yaml: &str) -> Result<Spec, PodrunError> {
        let pipeline = pipeline(yaml);
        let meta = RunMetadata::default();
        compiler.compile(&CompilerArgs {
            pipeline: &pipeline,
            meta: &meta,
        })
    }

    fn compile(yaml: &str) -> Spec {
        compile_with(&Compiler::default(), yaml).unwrap()
    }

    const SERIAL: &str = r#"
kind: pipeline
type: kubernetes
name: default
steps:
  - name: build
    image: golang
    commands: [go build]
  - name: test
    image: golang
    commands: [go test ./...]
"#;

    #[test]
    fn test_serial_pipeline_with_clone() {
        let spec = compile(SERIAL);
        let names: Vec<&str> = spec.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["clone", "build", "test"]);
        assert_eq!(spec.steps[1].depends_on, vec!["clone"]);
        assert_eq!(spec.steps[2].depends_on, vec!["build"]);
        assert_eq!(spec.steps[0].run_policy, RunPolicy::Never);
        assert_eq!(spec.pod.namespace, "default");
        assert!(spec.pod.name.starts_with("podrun-"));
    }

    #[test]
    fn test_clone_enabled_runs() {
        let compiler = Compiler {
            clone_enabled: true,
            ..Compiler::default()
        };
        let spec = compile_with(&compiler, SERIAL).unwrap();
        assert_eq!(spec.steps[0].run_policy, RunPolicy::OnSuccess);
        assert_eq!(spec.steps[0].image, CLONE_IMAGE);
    }

    #[test]
    fn test_clone_disabled_removes_dependency() {
        let spec = compile(
            r#"
name: default
clone:
  disable: true
steps:
  - name: build
    image: golang
    commands: [go build]
  - name: test
    image: golang
    commands: [go test]
    depends_on: [clone]
"#,
        );
        assert_eq!(spec.steps.len(), 2);
        assert!(spec.steps.iter().all(|s| s.depends_on.is_empty()));
    }

    #[test]
    fn test_commands_render_script() {
        let spec = compile(SERIAL);
        let build = spec.get_step("build").unwrap();
        assert_eq!(build.entrypoint, vec!["/bin/sh", "-c"]);
        assert_eq!(build.command[0], "set -e\necho '+ go build'\ngo build\n");
    }

    #[test]
    fn test_restricted_variable_rejected() {
        let err = compile_with(
            &Compiler::default(),
            r#"
name: default
steps:
  - name: build
    image: golang
    environment:
      PATH: /usr/local/bin
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PodrunError::RestrictedVariable { ref step, ref variable } if step == "build" && variable == "PATH"
        ));
    }

    #[test]
    fn test_restricted_pipeline_variable_rejected() {
        let err = compile_with(
            &Compiler::default(),
            r#"
name: default
environment:
  DOCKER_HOST: tcp://evil
steps:
  - name: build
    image: golang
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PodrunError::RestrictedVariable { .. }));
    }

    #[test]
    fn test_environment_layers() {
        let compiler = Compiler {
            environ: BTreeMap::from([
                ("GLOBAL".to_string(), "global".to_string()),
                ("LEVEL".to_string(), "global".to_string()),
            ]),
            ..Compiler::default()
        };
        let spec = compile_with(
            &compiler,
            r#"
name: default
environment:
  LEVEL: pipeline
  SHARED: pipeline
steps:
  - name: build
    image: golang
    environment:
      LEVEL: step
      TOKEN:
        from_secret: token
      EMPTY: ~
"#,
        )
        .unwrap();

        let build = spec.get_step("build").unwrap();
        assert_eq!(build.envs["GLOBAL"], "global");
        assert_eq!(build.envs["SHARED"], "pipeline");
        assert_eq!(build.envs["LEVEL"], "step");
        assert_eq!(build.envs["DRONE_STEP_NAME"], "build");
        assert_eq!(build.envs["DRONE_BUILD_EVENT"], "push");
        assert!(!build.envs.contains_key("TOKEN"));
        assert!(!build.envs.contains_key("EMPTY"));
        assert_eq!(build.secrets[0].name, "token");
    }

    #[test]
    fn test_limit_resolution_first_non_zero() {
        let compiler = Compiler {
            resources: Resources {
                limits: ResourceObject::from_megabytes(0, 256, 0),
                requests: ResourceObject::from_megabytes(1, 4, 0),
            },
            ..Compiler::default()
        };
        let spec = compile_with(
            &compiler,
            r#"
name: default
resources:
  limits:
    memory: 512MiB
steps:
  - name: build
    image: golang
  - name: big
    image: golang
    resources:
      limits:
        memory: 1GiB
      requests:
        cpu: 250
"#,
        )
        .unwrap();

        let build = spec.get_step("build").unwrap();
        assert_eq!(build.resources.limits.memory, 512 * MIB);
        assert_eq!(build.resources.requests.memory, 4 * MIB);
        assert_eq!(build.resources.requests.cpu, 1);

        let big = spec.get_step("big").unwrap();
        assert_eq!(big.resources.limits.memory, 1024 * MIB);
        assert_eq!(big.resources.requests.cpu, 250);
    }

    #[test]
    fn test_global_limit_in_megabytes() {
        let compiler = Compiler {
            resources: Resources {
                limits: ResourceObject::from_megabytes(500, 256, 0),
                requests: ResourceObject::default(),
            },
            ..Compiler::default()
        };
        let spec = compile_with(&compiler, SERIAL).unwrap();
        let build = spec.get_step("build").unwrap();
        assert_eq!(build.resources.limits.memory, 256 * 1_048_576);
        assert_eq!(build.resources.limits.cpu, 500);
    }

    #[test]
    fn test_policy_override() {
        let policies = resource::policy::parse(
            r#"
name: heavy
match:
  repo: ["local/*"]
namespace: builds
labels:
  team: ml
resources:
  limits:
    cpu: 4000
  requests:
    memory: 64MiB
"#,
            std::path::Path::new("policy.yml"),
        )
        .unwrap();
        let compiler = Compiler {
            resources: Resources {
                limits: ResourceObject::from_megabytes(1000, 256, 0),
                requests: ResourceObject::from_megabytes(1, 4, 0),
            },
            policies,
            ..Compiler::default()
        };
        let spec = compile_with(&compiler, SERIAL).unwrap();

        assert_eq!(spec.pod.namespace, "builds");
        assert_eq!(spec.pod.labels["team"], "ml");
        let build = spec.get_step("build").unwrap();
        assert_eq!(build.resources.limits.cpu, 4000);
        assert_eq!(build.resources.limits.memory, 256 * MIB);
        assert_eq!(build.resources.requests.memory, 64 * MIB);
        assert_eq!(build.resources.requests.cpu, 1);
    }

    #[test]
    fn test_run_and_error_policies() {
        let spec = compile(
            r#"
name: default
steps:
  - name: build
    image: golang
    failure: ignore
  - name: notify
    image: plugins/slack
    when:
      status: [failure]
  - name: report
    image: alpine
    when:
      status: [success, failure]
  - name: release
    image: alpine
    when:
      branch: [release/*]
"#,
        );
        let policy = |n: &str| spec.get_step(n).unwrap().run_policy;
        assert_eq!(spec.get_step("build").unwrap().err_policy, ErrPolicy::Ignore);
        assert_eq!(policy("build"), RunPolicy::OnSuccess);
        assert_eq!(policy("notify"), RunPolicy::OnFailure);
        assert_eq!(policy("report"), RunPolicy::Always);
        assert_eq!(policy("release"), RunPolicy::Never);
    }

    #[test]
    fn test_cycle_rejected() {
        let err = compile_with(
            &Compiler::default(),
            r#"
name: default
steps:
  - name: a
    image: alpine
    depends_on: [b]
  - name: b
    image: alpine
    depends_on: [a]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PodrunError::CircularDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = compile_with(
            &Compiler::default(),
            r#"
name: default
steps:
  - name: a
    image: alpine
    depends_on: [ghost]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, PodrunError::UnknownDependency { .. }));
    }

    #[test]
    fn test_services_and_privileged_plugins() {
        let spec = compile(
            r#"
name: default
services:
  - name: redis
    image: redis
steps:
  - name: publish
    image: plugins/docker:20
    settings:
      repo: octocat/app
  - name: script
    image: plugins/docker
    commands: [docker ps]
"#,
        );
        let redis = spec.get_step("redis").unwrap();
        assert!(redis.detach);
        let publish = spec.get_step("publish").unwrap();
        assert!(publish.privileged);
        assert_eq!(publish.envs["PLUGIN_REPO"], "octocat/app");
        assert!(!spec.get_step("script").unwrap().privileged);
    }

    #[test]
    fn test_secrets_resolved_and_missing_skipped() {
        let compiler = Compiler {
            secrets: Arc::new(StaticSecrets::new(BTreeMap::from([(
                "token".to_string(),
                "abc".to_string(),
            )]))),
            ..Compiler::default()
        };
        let spec = compile_with(
            &compiler,
            r#"
name: default
steps:
  - name: build
    image: alpine
    environment:
      TOKEN:
        from_secret: token
      OTHER:
        from_secret: missing
"#,
        )
        .unwrap();
        assert_eq!(spec.secrets.len(), 1);
        assert_eq!(spec.secrets["token"].data, "abc");
    }

    #[test]
    fn test_tmate_for_debug_builds() {
        let compiler = Compiler {
            tmate: Tmate {
                enabled: true,
                image: DEFAULT_TMATE_IMAGE.into(),
                server: "tmate.example.com".into(),
                port: "22".into(),
                ..Tmate::default()
            },
            ..Compiler::default()
        };
        let pipeline = pipeline(SERIAL);
        let mut meta = RunMetadata::default();

        let spec = compiler
            .compile(&CompilerArgs { pipeline: &pipeline, meta: &meta })
            .unwrap();
        assert!(!spec.steps[1].envs.contains_key("DRONE_TMATE_HOST"));

        meta.build.debug = true;
        let spec = compiler
            .compile(&CompilerArgs { pipeline: &pipeline, meta: &meta })
            .unwrap();
        assert_eq!(spec.steps[1].envs["DRONE_TMATE_HOST"], "tmate.example.com");
    }

    #[test]
    fn test_global_volumes_mounted() {
        let compiler = Compiler {
            volumes: BTreeMap::from([("/var/cache".to_string(), "/cache".to_string())]),
            ..Compiler::default()
        };
        let spec = compile_with(&compiler, SERIAL).unwrap();
        assert_eq!(spec.volumes.len(), 1);
        assert!(spec.steps.iter().all(|s| s.volumes.len() == 1));
        assert_eq!(spec.steps[1].volumes[0].path, "/cache");
    }

    #[test]
    fn test_ids_are_stable() {
        let a = compile(SERIAL);
        let b = compile(SERIAL);
        assert_eq!(a.pod.name, b.pod.name);
        assert_eq!(a.steps[1].id, b.steps[1].id);
        assert_ne!(a.steps[1].id, a.steps[2].id);
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_name("plugins/docker:20"), "plugins/docker");
        assert_eq!(image_name("registry:5000/app"), "registry:5000/app");
        assert_eq!(image_name("alpine@sha256:abc"), "alpine");
    }
}
