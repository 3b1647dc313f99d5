// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! Process engine
//!
//! Runs each step as a local process in the working directory. Images
//! are not pulled; steps must carry a command or rendered script.

use async_trait::async_trait;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Engine, Spec, Step, StepExit};
use crate::errors::PodrunError;

/// A started step. While `wait` owns the child, `kill` signals it
/// through the `kill` channel instead.
struct Running {
    child: Option<Child>,
    kill: Option<oneshot::Sender<()>>,
    readers: Vec<JoinHandle<()>>,
}

/// Local process engine
pub struct ProcessEngine {
    working_dir: PathBuf,
    pretty: bool,
    running: Mutex<HashMap<String, Running>>,
}

impl ProcessEngine {
    /// Create a new process engine rooted at `working_dir`
    pub fn new(working_dir: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            working_dir: working_dir.into(),
            pretty,
            running: Mutex::new(HashMap::new()),
        }
    }

    fn command_line(step: &Step) -> Option<(String, Vec<String>)> {
        let mut argv = step.entrypoint.iter().chain(&step.command).cloned();
        let program = argv.next()?;
        Some((program, argv.collect()))
    }

    fn prefix(&self, step: &Step) -> String {
        if self.pretty {
            format!("{}", format!("[{}]", step.name).cyan().bold())
        } else {
            format!("[{}]", step.name)
        }
    }

    fn stream<R>(reader: R, prefix: String, masks: Vec<String>) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(mut line)) => {
                        for mask in &masks {
                            line = line.replace(mask.as_str(), "********");
                        }
                        println!("{} {}", prefix, line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "log stream closed");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn setup(&self, spec: &Spec) -> Result<(), PodrunError> {
        which::which("sh").map_err(|e| PodrunError::BackendUnavailable {
            message: format!("no shell available: {}", e),
            help: Some("The process engine runs step scripts with 'sh'".into()),
        })?;

        if !self.working_dir.is_dir() {
            return Err(PodrunError::BackendUnavailable {
                message: format!(
                    "working directory '{}' does not exist",
                    self.working_dir.display()
                ),
                help: None,
            });
        }

        debug!(pod = %spec.pod.name, namespace = %spec.pod.namespace, "process engine ready");
        Ok(())
    }

    async fn start(&self, spec: &Spec, step: &Step) -> Result<(), PodrunError> {
        let (program, args) =
            Self::command_line(step).ok_or_else(|| PodrunError::StepFailed {
                step: step.name.clone(),
                message: format!(
                    "image '{}' has no command; the process engine cannot run image entrypoints",
                    step.image
                ),
            })?;

        debug!(step = %step.name, image = %step.image, %program, "starting process");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&self.working_dir)
            .envs(&step.envs)
            .envs(spec.secret_environ(step))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| PodrunError::StepFailed {
            step: step.name.clone(),
            message: format!("failed to spawn '{}': {}", program, e),
        })?;

        let masks: Vec<String> = step
            .secrets
            .iter()
            .filter_map(|var| spec.secrets.get(&var.name))
            .filter(|secret| secret.mask && !secret.data.is_empty())
            .map(|secret| secret.data.clone())
            .collect();

        let prefix = self.prefix(step);
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(Self::stream(stdout, prefix.clone(), masks.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(Self::stream(stderr, prefix, masks));
        }

        self.running
            .lock()
            .await
            .insert(
                step.id.clone(),
                Running {
                    child: Some(child),
                    kill: None,
                    readers,
                },
            );
        Ok(())
    }

    async fn wait(&self, _spec: &Spec, step: &Step) -> Result<StepExit, PodrunError> {
        let not_running = || PodrunError::StepFailed {
            step: step.name.clone(),
            message: "step is not running".into(),
        };
        let (mut child, readers, kill_rx) = {
            let mut running = self.running.lock().await;
            let entry = running.get_mut(&step.id).ok_or_else(not_running)?;
            let child = entry.child.take().ok_or_else(not_running)?;
            let (kill_tx, kill_rx) = oneshot::channel();
            entry.kill = Some(kill_tx);
            (child, std::mem::take(&mut entry.readers), kill_rx)
        };

        let status = tokio::select! {
            status = child.wait() => status,
            _ = kill_rx => {
                debug!(step = %step.name, "killing process");
                if let Err(e) = child.start_kill() {
                    warn!(step = %step.name, error = %e, "failed to stop process");
                }
                child.wait().await
            }
        };
        self.running.lock().await.remove(&step.id);

        let status = status.map_err(|e| PodrunError::StepFailed {
            step: step.name.clone(),
            message: e.to_string(),
        })?;

        for reader in readers {
            let _ = reader.await;
        }

        Ok(StepExit::code(status.code().unwrap_or(255)))
    }

    async fn kill(&self, _spec: &Spec, step: &Step) -> Result<(), PodrunError> {
        let mut running = self.running.lock().await;
        let Some(entry) = running.get_mut(&step.id) else {
            return Ok(());
        };
        match (entry.child.as_mut(), entry.kill.take()) {
            (Some(child), _) => child.start_kill()?,
            (None, Some(kill)) => {
                let _ = kill.send(());
            }
            (None, None) => {}
        }
        Ok(())
    }

    async fn destroy(&self, spec: &Spec) -> Result<(), PodrunError> {
        let mut running = self.running.lock().await;
        for (id, process) in running.drain() {
            if let Some(mut child) = process.child {
                if let Err(e) = child.start_kill() {
                    warn!(step_id = %id, error = %e, "failed to stop process");
                }
            }
            if let Some(kill) = process.kill {
                let _ = kill.send(());
            }
            for reader in process.readers {
                reader.abort();
            }
        }
        debug!(pod = %spec.pod.name, "process engine torn down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Secret, SecretVar};
    use std::sync::Arc;

    fn script_step(id: &str, script: &str) -> Step {
        Step {
            id: id.into(),
            name: id.into(),
            entrypoint: vec!["/bin/sh".into(), "-c".into()],
            command: vec![script.into()],
            ..Step::default()
        }
    }

    #[tokio::test]
    async fn test_exit_codes() {
        let engine = ProcessEngine::new(".", false);
        let spec = Spec::default();

        let ok = script_step("ok", "echo hello");
        engine.start(&spec, &ok).await.unwrap();
        assert!(engine.wait(&spec, &ok).await.unwrap().success());

        let bad = script_step("bad", "exit 3");
        engine.start(&spec, &bad).await.unwrap();
        assert_eq!(engine.wait(&spec, &bad).await.unwrap().exit_code, 3);
    }

    #[tokio::test]
    async fn test_environment_and_secrets() {
        let engine = ProcessEngine::new(".", false);
        let mut spec = Spec::default();
        spec.secrets.insert(
            "token".into(),
            Secret { name: "token".into(), data: "abc".into(), mask: true },
        );

        let mut step = script_step("env", r#"test "$GREETING" = hi && test "$TOKEN" = abc"#);
        step.envs.insert("GREETING".into(), "hi".into());
        step.secrets.push(SecretVar { name: "token".into(), env: "TOKEN".into() });

        engine.start(&spec, &step).await.unwrap();
        assert!(engine.wait(&spec, &step).await.unwrap().success());
    }

    #[tokio::test]
    async fn test_kill_stops_waited_step() {
        let engine = Arc::new(ProcessEngine::new(".", false));
        let spec = Arc::new(Spec::default());
        let step = Arc::new(script_step("sleep", "sleep 30"));
        engine.start(&spec, &step).await.unwrap();

        let waiter = {
            let (engine, spec, step) = (Arc::clone(&engine), Arc::clone(&spec), Arc::clone(&step));
            tokio::spawn(async move { engine.wait(&spec, &step).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        engine.kill(&spec, &step).await.unwrap();

        let exit = tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("wait did not return after kill")
            .unwrap()
            .unwrap();
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_step_without_command_fails_to_start() {
        let engine = ProcessEngine::new(".", false);
        let step = Step {
            id: "plugin".into(),
            name: "plugin".into(),
            image: "plugins/docker".into(),
            ..Step::default()
        };
        let result = engine.start(&Spec::default(), &step).await;
        assert!(matches!(result, Err(PodrunError::StepFailed { .. })));
    }
}
