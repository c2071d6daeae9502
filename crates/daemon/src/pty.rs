// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PTY host: one child process attached to a pseudoterminal.
//!
//! The host spawns the child, pumps raw output bytes to the session actor
//! over a channel from a blocking reader thread, and reports the exit from a
//! separate waiter thread. The waiter is the sole source of the exit record,
//! so a read error racing a real exit can never produce two of them.

use std::io::{Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use harness_core::ExitStatus;

/// Bytes sent to the PTY on `interrupt` / `eof` signals.
const ETX: u8 = 0x03;
const EOT: u8 = 0x04;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    Open(String),

    #[error("failed to spawn {command:?}: {message}")]
    Spawn { command: String, message: String },

    #[error("pty io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messages from the PTY host to its session actor.
#[derive(Debug)]
pub enum PtyOutput {
    Chunk(Vec<u8>),
    Exit(ExitStatus),
}

/// Launch parameters for one PTY child.
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub cols: u16,
    pub rows: u16,
    pub env: Vec<(String, String)>,
}

impl PtyCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            cols: 80,
            rows: 24,
            env: Vec::new(),
        }
    }
}

/// A live PTY child.
pub struct PtyHost {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl PtyHost {
    /// Spawn `cmd` on a fresh PTY. Output and the final exit arrive on `tx`.
    pub fn spawn(cmd: &PtyCommand, tx: mpsc::Sender<PtyOutput>) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();
        let size = PtySize { rows: cmd.rows, cols: cmd.cols, pixel_width: 0, pixel_height: 0 };
        let pair = pty_system.openpty(size).map_err(|e| PtyError::Open(e.to_string()))?;

        let mut builder = CommandBuilder::new(&cmd.command);
        builder.args(&cmd.args);
        if let Some(cwd) = &cmd.cwd {
            builder.cwd(cwd);
        }
        for (key, value) in &cmd.env {
            builder.env(key, value);
        }

        let mut child = pair.slave.spawn_command(builder).map_err(|e| PtyError::Spawn {
            command: cmd.command.clone(),
            message: e.to_string(),
        })?;
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();

        let mut reader =
            pair.master.try_clone_reader().map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair.master.take_writer().map_err(|e| PtyError::Open(e.to_string()))?;

        // Reader thread: raw chunks until EOF. No exit record from here.
        let chunk_tx = tx.clone();
        std::thread::Builder::new().name("pty-reader".to_string()).spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunk_tx.blocking_send(PtyOutput::Chunk(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(%err, "pty read ended");
                        break;
                    }
                }
            }
        })?;

        // Waiter thread: the single source of the exit record.
        std::thread::Builder::new().name("pty-waiter".to_string()).spawn(move || {
            let exit = match child.wait() {
                Ok(status) => ExitStatus { code: Some(status.exit_code() as i32), signal: None },
                Err(err) => {
                    warn!(%err, "pty wait failed");
                    ExitStatus { code: None, signal: None }
                }
            };
            let _ = tx.blocking_send(PtyOutput::Exit(exit));
        })?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            master: pair.master,
            killer,
            pid,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    /// Write input bytes to the child's terminal.
    pub fn write(&self, bytes: &[u8]) -> Result<(), PtyError> {
        let mut writer = self.writer.lock();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        let _ = self.master.resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 });
    }

    /// `interrupt` rides the terminal line discipline as ^C.
    pub fn interrupt(&self) -> Result<(), PtyError> {
        self.write(&[ETX])
    }

    /// `eof` as ^D.
    pub fn eof(&self) -> Result<(), PtyError> {
        self.write(&[EOT])
    }

    /// Hard-terminate the child. The waiter thread reports the exit.
    pub fn terminate(&mut self) {
        if let Err(err) = self.killer.kill() {
            debug!(%err, "pty kill failed (already exited?)");
        }
    }
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
