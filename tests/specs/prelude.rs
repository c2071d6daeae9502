// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for workspace specs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Polling ceiling for spec waits.
pub const SPEC_WAIT_MAX_MS: u64 = 10_000;

/// A throwaway workspace: its own config root and invocation directory, so
/// specs never touch the real `~/.config/harness`.
pub struct Workspace {
    pub config_root: tempfile::TempDir,
    pub root: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            config_root: tempfile::tempdir().expect("config tempdir"),
            root: tempfile::tempdir().expect("workspace tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// A `harness` invocation scoped to this workspace.
    pub fn harness(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("harness").expect("harness binary");
        cmd.env("XDG_CONFIG_HOME", self.config_root.path())
            .env("HARNESS_INVOKE_CWD", self.path())
            .env("HARNESS_DAEMON_BIN", daemon_bin())
            .env("HARNESS_NO_DESKTOP_NOTIFY", "1")
            .env_remove("HARNESS_SESSION_NAME")
            .env_remove("HARNESS_CONTROL_PLANE_PORT")
            .env_remove("HARNESS_CONTROL_PLANE_HOST");
        cmd
    }

    /// The resolved runtime directory for the default gateway.
    pub fn gateway_dir(&self) -> PathBuf {
        let layout = harness_core::paths::WorkspaceLayout::new(
            &self.config_root.path().join("harness"),
            self.path(),
            None,
        )
        .expect("layout");
        layout.gateway_dir()
    }

    pub fn record_path(&self) -> PathBuf {
        self.gateway_dir().join("gateway.json")
    }

    pub fn read_record(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(self.record_path()).expect("gateway record");
        serde_json::from_str(&raw).expect("record json")
    }

    /// Best-effort teardown for specs that leave a daemon running.
    pub fn stop_gateway(&self) {
        let _ = self
            .harness()
            .args(["gateway", "stop", "--force", "--no-cleanup-orphans"])
            .timeout(Duration::from_secs(20))
            .output();
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.stop_gateway();
    }
}

/// Locate the freshly built `harnessd` next to the `harness` test binary.
pub fn daemon_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin("harnessd")
}

/// Poll until `check` passes or the deadline elapses.
pub fn wait_for(max_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
