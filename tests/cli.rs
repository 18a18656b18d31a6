// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MANIFEST: &str = r#"
kind: pipeline
type: exec
name: build

clone:
  disable: true

steps:
- name: greet
  commands:
  - echo hello from ${GREETING_TARGET}

- name: test
  commands:
  - echo testing
  depends_on:
  - greet

---
kind: pipeline
type: exec
name: deploy

steps:
- name: ship
  commands:
  - echo shipping
"#;

fn write_manifest(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join(".drover.yml");
    std::fs::write(&path, content).unwrap();
    path
}

fn drover(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("drover").unwrap();
    cmd.current_dir(dir)
        .env("RUST_LOG", "off")
        // keep a user's runner config out of the tests
        .arg("--config")
        .arg(empty_config(dir));
    cmd
}

fn empty_config(dir: &Path) -> PathBuf {
    let path = dir.join("drover-test-config.toml");
    std::fs::write(&path, "").unwrap();
    path
}

#[test]
fn test_compile_prints_plan() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir, MANIFEST);

    drover(dir.path())
        .args(["compile", "--stage-name", "build", "--env", "GREETING_TARGET=drover"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"greet\""))
        .stdout(predicate::str::contains("\"name\": \"test\""))
        .stdout(predicate::str::contains("hello from drover"))
        .stdout(predicate::str::contains("\"name\": \"clone\"").not());
}

#[test]
fn test_compile_unknown_pipeline() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir, MANIFEST);

    drover(dir.path())
        .args(["compile", "--stage-name", "release"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("release"));
}

#[test]
fn test_missing_manifest() {
    let dir = TempDir::new().unwrap();

    drover(dir.path())
        .args(["compile", "--stage-name", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_graph_text() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir, MANIFEST);

    drover(dir.path())
        .args(["graph", "--stage-name", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. greet"))
        .stdout(predicate::str::contains("2. test"))
        .stdout(predicate::str::contains("[depends: greet]"));
}

#[test]
fn test_validate_ok() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir, MANIFEST);

    drover(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Manifest is valid!"));
}

#[test]
fn test_validate_unknown_dependency() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        &dir,
        r#"
kind: pipeline
type: exec
name: broken
steps:
- name: a
  commands: [echo a]
  depends_on: [missing]
"#,
    );

    drover(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing"));
}

#[cfg(unix)]
#[test]
fn test_exec_success() {
    let dir = TempDir::new().unwrap();
    write_manifest(&dir, MANIFEST);

    drover(dir.path())
        .args([
            "exec",
            "--stage-name",
            "build",
            "--pretty",
            "false",
            "--env",
            "GREETING_TARGET=drover",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("[greet] hello from drover"))
        .stdout(predicate::str::contains("[test] testing"));
}

#[cfg(unix)]
#[test]
fn test_exec_failure_exit_code() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        &dir,
        r#"
kind: pipeline
type: exec
name: failing
clone:
  disable: true
steps:
- name: broken
  commands:
  - exit 3
- name: after
  commands:
  - echo unreachable
"#,
    );

    drover(dir.path())
        .args(["exec", "--pretty", "false"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unreachable").not());
}

#[cfg(unix)]
#[test]
fn test_exec_masks_secrets() {
    let dir = TempDir::new().unwrap();
    write_manifest(
        &dir,
        r#"
kind: pipeline
type: exec
name: secret
clone:
  disable: true
steps:
- name: leak
  environment:
    TOKEN:
      from_secret: token
  commands:
  - echo "token=$TOKEN"
"#,
    );

    drover(dir.path())
        .args(["exec", "--pretty", "false", "--secret", "token=s3cr3t-value"])
        .assert()
        .success()
        .stdout(predicate::str::contains("token=********"))
        .stdout(predicate::str::contains("s3cr3t-value").not());
}
