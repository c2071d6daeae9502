// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphan subprocess cleanup.
//!
//! After a daemon crash, helpers it spawned reparent to init and linger.
//! Four classes are reaped, each discovered by scanning the local process
//! table (`ppid == 1`, self excluded) and matching command signatures:
//! stale gateway daemons, `sqlite3` helpers on the workspace database, PTY
//! helper binaries from the workspace bin directory, and notification-relay
//! scripts from the workspace scripts directory.
//!
//! The table parser is best-effort: unreadable or vanished rows are skipped,
//! never fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::daemon_process::{terminate_process, TerminateOutcome};

/// Workspace signature the matchers run against.
#[derive(Debug, Clone)]
pub struct OrphanContext {
    pub db_path: PathBuf,
    pub bin_dir: PathBuf,
    pub scripts_dir: PathBuf,
}

/// The four reapable classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanClass {
    Daemon,
    Sqlite,
    PtyHelper,
    NotifyRelay,
}

impl OrphanClass {
    pub const ALL: [OrphanClass; 4] =
        [Self::Daemon, Self::Sqlite, Self::PtyHelper, Self::NotifyRelay];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daemon => "daemon",
            Self::Sqlite => "sqlite",
            Self::PtyHelper => "pty helper",
            Self::NotifyRelay => "notify relay",
        }
    }

    /// Daemons get group signals; helpers are plain processes.
    fn signal_group(&self) -> bool {
        matches!(self, Self::Daemon)
    }
}

/// One process-table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: u32,
    pub ppid: u32,
    pub argv: Vec<String>,
}

/// Scan `/proc` once. Invalid rows are ignored.
pub fn scan_process_table() -> Vec<ProcEntry> {
    let Ok(entries) = std::fs::read_dir("/proc") else { return Vec::new() };
    let mut table = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else { continue };
        let Some(ppid) = read_ppid(pid) else { continue };
        let argv = read_argv(pid);
        if argv.is_empty() {
            continue;
        }
        table.push(ProcEntry { pid, ppid, argv });
    }
    table
}

fn read_ppid(pid: u32) -> Option<u32> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    let after_comm = stat.rsplit_once(')')?.1;
    after_comm.split_whitespace().nth(1).and_then(|field| field.parse().ok())
}

fn read_argv(pid: u32) -> Vec<String> {
    let Ok(raw) = std::fs::read(format!("/proc/{pid}/cmdline")) else { return Vec::new() };
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Does this process-table row belong to `class` for this workspace?
pub fn matches_class(class: OrphanClass, entry: &ProcEntry, ctx: &OrphanContext) -> bool {
    let argv0 = entry.argv.first().map(String::as_str).unwrap_or_default();
    let db = ctx.db_path.to_string_lossy();
    match class {
        OrphanClass::Daemon => {
            let flag_match = entry
                .argv
                .windows(2)
                .any(|pair| pair[0] == "--state-db-path" && pair[1] == db);
            let script_match = Path::new(argv0).starts_with(&ctx.bin_dir)
                && argv0.ends_with(crate::daemon_process::DAEMON_BIN);
            flag_match || script_match
        }
        OrphanClass::Sqlite => {
            let is_sqlite = Path::new(argv0)
                .file_name()
                .map(|n| n.to_string_lossy().contains("sqlite3"))
                .unwrap_or(false);
            is_sqlite && entry.argv.iter().skip(1).any(|arg| arg.contains(db.as_ref()))
        }
        OrphanClass::PtyHelper => {
            Path::new(argv0).starts_with(&ctx.bin_dir)
                && !argv0.ends_with(crate::daemon_process::DAEMON_BIN)
        }
        OrphanClass::NotifyRelay => {
            entry.argv.iter().any(|arg| Path::new(arg).starts_with(&ctx.scripts_dir))
        }
    }
}

/// Per-class cleanup outcome. `terminated ∪ failed ⊆ matched`, disjoint.
#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub class: OrphanClass,
    pub matched: Vec<u32>,
    pub terminated: Vec<u32>,
    pub failed: Vec<u32>,
    pub error: Option<String>,
}

impl ClassSummary {
    /// Human line for stdout, one per class.
    pub fn line(&self) -> String {
        let label = self.class.label();
        if let Some(error) = &self.error {
            return format!("orphan {label} cleanup: error: {error}");
        }
        if self.matched.is_empty() {
            return format!("orphan {label} cleanup: none found");
        }
        format!(
            "orphan {label} cleanup: terminated {} process(es) (matched={} terminated={} failed={})",
            self.terminated.len(),
            self.matched.len(),
            self.terminated.len(),
            self.failed.len(),
        )
    }
}

/// Reap all four classes. One table scan per invocation.
pub async fn cleanup_orphans(
    ctx: &OrphanContext,
    force: bool,
    timeout: Duration,
) -> Vec<ClassSummary> {
    let table = scan_process_table();
    let self_pid = std::process::id();
    let mut summaries = Vec::new();

    for class in OrphanClass::ALL {
        let matched: Vec<u32> = table
            .iter()
            .filter(|entry| {
                entry.ppid == 1 && entry.pid != self_pid && matches_class(class, entry, ctx)
            })
            .map(|entry| entry.pid)
            .collect();

        let mut terminated = Vec::new();
        let mut failed = Vec::new();
        for &pid in &matched {
            match terminate_process(pid, class.signal_group(), force, timeout).await {
                TerminateOutcome::Terminated => terminated.push(pid),
                TerminateOutcome::Failed => failed.push(pid),
            }
        }
        summaries.push(ClassSummary { class, matched, terminated, failed, error: None });
    }
    summaries
}

#[cfg(test)]
#[path = "orphans_tests.rs"]
mod tests;
