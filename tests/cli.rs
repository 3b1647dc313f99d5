// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 podrun contributors

//! End-to-end tests for the podrun binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const SERIAL: &str = r#"
kind: pipeline
type: kubernetes
name: default

steps:
  - name: build
    image: alpine
    commands:
      - echo hello
  - name: test
    image: alpine
    commands:
      - echo tested
"#;

fn workspace(manifest: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".drone.yml"), manifest).unwrap();
    dir
}

fn podrun(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("podrun").unwrap();
    cmd.current_dir(dir)
        .env_remove("PODRUN_DEBUG")
        .env_remove("PODRUN_TRACE")
        .env_remove("PODRUN_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_lint_valid_pipeline() {
    let dir = workspace(SERIAL);
    podrun(dir.path())
        .arg("lint")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline is valid"));
}

#[test]
fn test_lint_reports_unknown_dependency() {
    let dir = workspace(
        r#"
kind: pipeline
type: kubernetes
name: default
steps:
  - name: build
    image: alpine
    commands: [make]
    depends_on: [compile]
"#,
    );
    podrun(dir.path())
        .arg("lint")
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown step 'compile'"));
}

#[test]
fn test_lint_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    podrun(dir.path()).arg("lint").assert().failure();
}

#[test]
fn test_compile_prints_spec() {
    let dir = workspace(SERIAL);
    podrun(dir.path())
        .args(["compile", "--namespace", "ci"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"namespace\": \"ci\""))
        .stdout(predicate::str::contains("\"name\": \"clone\""))
        .stdout(predicate::str::contains("\"run_policy\": \"never\""));
}

#[test]
fn test_compile_rejects_restricted_variable() {
    let dir = workspace(
        r#"
kind: pipeline
type: kubernetes
name: default
steps:
  - name: build
    image: alpine
    commands: [make]
    environment:
      DOCKER_HOST: tcp://evil:2375
"#,
    );
    podrun(dir.path())
        .arg("compile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DOCKER_HOST"));
}

#[test]
fn test_graph_text_and_dot() {
    let dir = workspace(SERIAL);
    podrun(dir.path())
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("test (on-success) [depends: build]"));

    podrun(dir.path())
        .args(["graph", "--format", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph pipeline"))
        .stdout(predicate::str::contains("\"build\" -> \"test\""));
}

#[test]
fn test_exec_runs_steps_in_order() {
    let dir = workspace(SERIAL);
    podrun(dir.path())
        .arg("exec")
        .assert()
        .success()
        .stdout(predicate::str::contains("[build] hello"))
        .stdout(predicate::str::contains("[test] tested"))
        .stdout(predicate::str::contains("Pipeline success"));
}

#[test]
fn test_exec_failing_step_exits_one() {
    let dir = workspace(
        r#"
kind: pipeline
type: kubernetes
name: default
steps:
  - name: build
    image: alpine
    commands: [exit 1]
  - name: notify
    image: alpine
    commands: [echo notified]
    when:
      status: [failure]
"#,
    );
    podrun(dir.path())
        .arg("exec")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("[notify] notified"));
}

#[test]
fn test_exec_include_and_dump() {
    let dir = workspace(SERIAL);
    podrun(dir.path())
        .args(["exec", "--include", "test", "--dump"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[test] tested"))
        .stdout(predicate::str::contains("[build]").not())
        .stdout(predicate::str::contains("\"status\": \"success\""));
}

#[test]
fn test_exec_masks_secrets() {
    let dir = workspace(
        r#"
kind: pipeline
type: kubernetes
name: default
steps:
  - name: publish
    image: alpine
    environment:
      TOKEN:
        from_secret: token
    commands:
      - echo token=$${TOKEN}
"#,
    );
    podrun(dir.path())
        .args(["exec", "--secrets", "token=s3cr3t"])
        .assert()
        .success()
        .stdout(predicate::str::contains("token=********"))
        .stdout(predicate::str::contains("s3cr3t").not());
}

#[test]
fn test_exec_unknown_stage() {
    let dir = workspace(SERIAL);
    podrun(dir.path())
        .args(["exec", "--stage-name", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}
