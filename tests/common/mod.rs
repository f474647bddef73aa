//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Scratch scripts tree plus an isolated playbooks root.
pub struct Workspace {
    temp: TempDir,
    pub scripts: PathBuf,
    pub playbooks: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let scripts = temp.path().join("scripts");
        let playbooks = temp.path().join("playbooks");
        fs::create_dir_all(&scripts).expect("create scripts root");
        Self {
            temp,
            scripts,
            playbooks,
        }
    }

    /// Write a shell script under the scripts root.
    pub fn script(&self, relative: &str, body: &str) -> PathBuf {
        let path = self.scripts.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create script dir");
        }
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        path
    }

    /// Run the binary with both roots pinned to this workspace.
    pub fn seqrun(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("spawn seqrun")
    }

    /// Run the binary from `cwd`, e.g. to resolve relative root flags.
    pub fn seqrun_in(&self, cwd: &Path, args: &[&str]) -> Output {
        self.command(args)
            .current_dir(cwd)
            .output()
            .expect("spawn seqrun")
    }

    /// Directory holding both roots.
    pub fn base(&self) -> &Path {
        self.temp.path()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_seqrun"));
        cmd.args(args)
            .env("SEQRUN_SCRIPTS_ROOT", &self.scripts)
            .env("SEQRUN_PLAYBOOKS_ROOT", &self.playbooks)
            .env_remove("SEQRUN_LOG");
        cmd
    }

    /// Run and parse stdout as JSON.
    pub fn seqrun_json(&self, args: &[&str]) -> (Output, serde_json::Value) {
        let output = self.seqrun(args);
        let value = serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
            panic!(
                "stdout is not JSON ({err}): {}\nstderr: {}",
                stdout(&output),
                String::from_utf8_lossy(&output.stderr)
            )
        });
        (output, value)
    }

    pub fn playbook_path(&self, name: &str) -> PathBuf {
        self.playbooks.join(format!("{name}.json"))
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Check if `sh` is available; skip test if not.
pub fn skip_if_no_shell() -> bool {
    let missing = Command::new("sh")
        .arg("-c")
        .arg("exit 0")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_err();
    if missing {
        eprintln!("Skipping: sh not available");
    }
    missing
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}
