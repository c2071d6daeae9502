// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit-code policy: 0 success, 1 failure, 2 usage.

/// A CLI failure with its exit code.
#[derive(Debug)]
pub struct ExitError {
    pub code: u8,
    pub message: String,
}

impl ExitError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { code: 1, message: message.into() }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self { code: 2, message: message.into() }
    }
}

impl std::fmt::Display for ExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ExitError {}

impl From<anyhow::Error> for ExitError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ExitError>() {
            Ok(exit) => exit,
            Err(err) => Self::failure(format!("{err:#}")),
        }
    }
}
