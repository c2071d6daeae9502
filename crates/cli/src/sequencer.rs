// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup sequencer for the active session.
//!
//! An explicit state machine that watches the first PTY output, the first
//! visible paint, and a configurable settle gate, then declares the session
//! "settled" once output has been quiet long enough. Deferred client work
//! (resuming persisted conversations, process-usage sampling) waits on
//! `settled` or the hard cap, whichever lands first.
//!
//! Transition methods return whether the state was newly entered so callers
//! can fire one-shot side effects without tracking their own flags.

use std::time::{Duration, Instant};

/// The readiness marker that opens the settle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleGate {
    /// A recognizable header row is on screen (codex agents).
    HeaderVisible,
    /// At least this many glyph cells rendered (everything else).
    GlyphThreshold(usize),
}

/// Fallback settle delay after first paint when the gate never fires.
pub const SETTLE_FALLBACK: Duration = Duration::from_millis(1500);

/// Hard cap on waiting for settle, measured from activation.
pub const SETTLE_HARD_CAP: Duration = Duration::from_secs(5);

/// Observed startup state for the active session.
#[derive(Debug)]
pub struct StartupSequencer {
    gate: SettleGate,
    quiet: Duration,
    activated_at: Instant,
    first_output_at: Option<Instant>,
    first_paint_at: Option<Instant>,
    gate_at: Option<Instant>,
    last_output_at: Option<Instant>,
    settled_at: Option<Instant>,
}

impl StartupSequencer {
    pub fn new(gate: SettleGate, quiet: Duration, now: Instant) -> Self {
        Self {
            gate,
            quiet,
            activated_at: now,
            first_output_at: None,
            first_paint_at: None,
            gate_at: None,
            last_output_at: None,
            settled_at: None,
        }
    }

    /// A PTY output chunk arrived. True on the first one.
    pub fn observe_output(&mut self, now: Instant) -> bool {
        self.last_output_at = Some(now);
        if self.first_output_at.is_none() {
            self.first_output_at = Some(now);
            return true;
        }
        false
    }

    /// A render completed with `glyphs` non-empty cells. True on the first
    /// visible paint (after first output, with anything on screen).
    pub fn observe_paint(&mut self, glyphs: usize, now: Instant) -> bool {
        if self.first_output_at.is_none() || glyphs == 0 {
            return false;
        }
        let newly_painted = self.first_paint_at.is_none();
        if newly_painted {
            self.first_paint_at = Some(now);
        }
        // Glyph-threshold gates are observed from paints.
        if let SettleGate::GlyphThreshold(threshold) = self.gate {
            if self.gate_at.is_none() && glyphs >= threshold {
                self.gate_at = Some(now);
            }
        }
        newly_painted
    }

    /// The header-visible gate was recognized. True when newly entered.
    pub fn observe_header(&mut self, now: Instant) -> bool {
        if self.gate != SettleGate::HeaderVisible || self.gate_at.is_some() {
            return false;
        }
        self.gate_at = Some(now);
        true
    }

    pub fn first_output_observed(&self) -> bool {
        self.first_output_at.is_some()
    }

    pub fn first_paint_observed(&self) -> bool {
        self.first_paint_at.is_some()
    }

    pub fn gate_observed(&self) -> bool {
        self.gate_at.is_some()
    }

    pub fn settled(&self) -> bool {
        self.settled_at.is_some()
    }

    /// Advance the clock. True when `settled` was newly entered.
    ///
    /// Settle paths, first wins:
    /// - gate observed and no output for the quiet window;
    /// - first paint observed and the fallback timer elapsed;
    /// - the hard cap elapsed since activation.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.settled_at.is_some() {
            return false;
        }
        let quiet_since_gate = match (self.gate_at, self.last_output_at) {
            (Some(_), Some(last)) => now.duration_since(last) >= self.quiet,
            (Some(gate), None) => now.duration_since(gate) >= self.quiet,
            _ => false,
        };
        let fallback =
            self.first_paint_at.is_some_and(|paint| now.duration_since(paint) >= SETTLE_FALLBACK);
        let capped = now.duration_since(self.activated_at) >= SETTLE_HARD_CAP;

        if quiet_since_gate || fallback || capped {
            self.settled_at = Some(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
#[path = "sequencer_tests.rs"]
mod tests;
