//! Common test utilities for capstan integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute the
//! user's data directory.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;
pub use tempfile::TempDir;

/// A test environment with an initialized git repository and isolated data
/// storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `repo_dir`: A real git repository with one commit on `main`
/// - `data_dir`: Holds capstan's data (via `CAPSTAN_DATA_DIR` env var)
///
/// The `cap()` method returns a `Command` that sets `CAPSTAN_DATA_DIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub repo_dir: TempDir,
    pub data_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with a git repository on `main`.
    pub fn new() -> Self {
        let env = Self {
            repo_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
        };
        env.git(&["init", "-b", "main"]);
        env.git(&["config", "user.email", "test@example.com"]);
        env.git(&["config", "user.name", "Test"]);
        env.git(&["commit", "--allow-empty", "-m", "init"]);
        env
    }

    /// Create a new test environment and initialize capstan.
    pub fn init() -> Self {
        let env = Self::new();
        env.cap().args(["system", "init"]).assert().success();
        env
    }

    /// Get a Command for the cap binary with isolated data directory.
    pub fn cap(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cap"));
        cmd.current_dir(self.repo_dir.path());
        cmd.env("CAPSTAN_DATA_DIR", self.data_dir.path());
        cmd
    }

    /// Run a git command in the repository, asserting success.
    pub fn git(&self, args: &[&str]) {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(self.repo_dir.path())
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// The branch currently checked out in the repository.
    pub fn current_branch(&self) -> String {
        let output = std::process::Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(self.repo_dir.path())
            .output()
            .expect("failed to run git");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Whether a local branch exists in the repository.
    pub fn branch_exists(&self, name: &str) -> bool {
        std::process::Command::new("git")
            .args([
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{}", name),
            ])
            .current_dir(self.repo_dir.path())
            .status()
            .expect("failed to run git")
            .success()
    }

    /// Get the path to the repo directory.
    pub fn path(&self) -> &Path {
        self.repo_dir.path()
    }

    /// Run a cap command expected to succeed and parse its JSON output.
    pub fn cap_json(&self, args: &[&str]) -> serde_json::Value {
        let assert = self.cap().args(args).assert().success();
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
        serde_json::from_str(stdout.trim()).unwrap_or_else(|e| {
            panic!("cap {:?} produced unparseable JSON ({}): {}", args, e, stdout)
        })
    }

    /// Create a ticket and return its id.
    pub fn create_ticket(&self, title: &str) -> String {
        let json = self.cap_json(&["ticket", "create", title]);
        json["ticket"]["id"].as_str().unwrap().to_string()
    }

    /// Create an epic and return its id.
    pub fn create_epic(&self, title: &str) -> String {
        let json = self.cap_json(&["epic", "create", title]);
        json["epic"]["id"].as_str().unwrap().to_string()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
