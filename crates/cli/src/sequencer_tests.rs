// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn at(start: Instant, ms: u64) -> Instant {
    start + Duration::from_millis(ms)
}

#[test]
fn first_output_fires_once() {
    let start = Instant::now();
    let mut seq = StartupSequencer::new(
        SettleGate::GlyphThreshold(10),
        Duration::from_millis(200),
        start,
    );
    assert!(seq.observe_output(at(start, 10)));
    assert!(!seq.observe_output(at(start, 20)));
    assert!(seq.first_output_observed());
}

#[test]
fn paint_requires_prior_output_and_glyphs() {
    let start = Instant::now();
    let mut seq = StartupSequencer::new(
        SettleGate::GlyphThreshold(10),
        Duration::from_millis(200),
        start,
    );
    // Paint before any output does not count.
    assert!(!seq.observe_paint(50, at(start, 5)));
    seq.observe_output(at(start, 10));
    // Empty screen does not count either.
    assert!(!seq.observe_paint(0, at(start, 15)));
    assert!(seq.observe_paint(3, at(start, 20)));
    assert!(!seq.observe_paint(5, at(start, 25)));
    assert!(seq.first_paint_observed());
}

#[test]
fn glyph_threshold_gate_opens_from_paints() {
    let start = Instant::now();
    let mut seq = StartupSequencer::new(
        SettleGate::GlyphThreshold(10),
        Duration::from_millis(200),
        start,
    );
    seq.observe_output(at(start, 10));
    seq.observe_paint(5, at(start, 20));
    assert!(!seq.gate_observed(), "below threshold");
    seq.observe_paint(15, at(start, 30));
    assert!(seq.gate_observed());
}

#[test]
fn header_gate_ignored_for_glyph_mode_and_vice_versa() {
    let start = Instant::now();
    let mut glyphs = StartupSequencer::new(
        SettleGate::GlyphThreshold(10),
        Duration::from_millis(200),
        start,
    );
    assert!(!glyphs.observe_header(at(start, 10)));

    let mut header =
        StartupSequencer::new(SettleGate::HeaderVisible, Duration::from_millis(200), start);
    header.observe_output(at(start, 5));
    assert!(header.observe_header(at(start, 10)));
    assert!(!header.observe_header(at(start, 15)));
    assert!(header.gate_observed());
}

#[test]
fn settles_after_quiet_window_past_gate() {
    let start = Instant::now();
    let mut seq =
        StartupSequencer::new(SettleGate::HeaderVisible, Duration::from_millis(200), start);
    seq.observe_output(at(start, 10));
    seq.observe_header(at(start, 50));

    // Output keeps arriving: not settled.
    seq.observe_output(at(start, 100));
    assert!(!seq.poll(at(start, 250)));

    // Quiet for the window: settled exactly once.
    assert!(seq.poll(at(start, 301)));
    assert!(!seq.poll(at(start, 400)));
    assert!(seq.settled());
}

#[test]
fn fallback_settles_after_first_paint_without_gate() {
    let start = Instant::now();
    let mut seq = StartupSequencer::new(
        SettleGate::GlyphThreshold(1000),
        Duration::from_millis(200),
        start,
    );
    seq.observe_output(at(start, 10));
    seq.observe_paint(5, at(start, 20));

    assert!(!seq.poll(at(start, 1000)));
    // 1500ms after first paint the fallback fires.
    assert!(seq.poll(at(start, 1521)));
}

#[test]
fn hard_cap_settles_even_with_no_output_at_all() {
    let start = Instant::now();
    let mut seq =
        StartupSequencer::new(SettleGate::HeaderVisible, Duration::from_millis(200), start);
    assert!(!seq.poll(at(start, 4999)));
    assert!(seq.poll(at(start, 5001)));
}
