//! Common test utilities for flowpulse integration tests
//!
//! - temporary workspaces for suite and config files
//! - a preconfigured `assert_cmd` command for the binary
//! - blocking helpers for running the synchronous engine under tokio

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch directory that holds suite and config files
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `name` inside the workspace
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    /// Environment config pointing every environment at `root_url`
    pub fn env_config(&self, root_url: &str) -> PathBuf {
        self.write("env-config.yml", &env_config_yaml(root_url))
    }
}

pub fn env_config_yaml(root_url: &str) -> String {
    format!(
        r#"environments:
  dev:
    rootUrl: {root}
    headers:
      X-Suite: flowpulse
    params:
      region: eu
  test:
    rootUrl: {root}/test
accounts:
  admin:
    username: admin
    password: s3cret
    loginUrl: /auth/login
    refreshUrl: /auth/refresh
"#,
        root = root_url
    )
}

/// The binary with a clean environment, run from `cwd`
pub fn flowpulse(cwd: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_flowpulse"));
    cmd.current_dir(cwd)
        .env_remove("ENV")
        .env_remove("FLOWPULSE_PROFILE")
        .env_remove("RUST_LOG");
    cmd
}

/// Run blocking engine code off the async test runtime
pub async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task panicked")
}
