// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observed-event hub.
//!
//! Publish/subscribe keyed by scope with a process-wide monotonic cursor.
//! Publishing and subscribing share one lock, so a subscriber that replays
//! from `afterCursor` and then registers can never miss or duplicate an
//! event: it receives a contiguous suffix starting at `afterCursor + 1`.
//!
//! Cursors reset on daemon restart; a bounded ring keeps recent events for
//! replay and drops the oldest beyond capacity.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use harness_core::{ObservedEvent, ObservedPayload, Scope};
use harness_wire::ServerEnvelope;

use crate::outbound::{ConnId, Outbound};

/// Retained events for `afterCursor` replay.
const RING_CAPACITY: usize = 1024;

/// Hub subscription identifier.
pub type SubId = u64;

struct HubSub {
    scope: Scope,
    /// `key-events.subscribe` delivers only key events and prompts.
    key_events_only: bool,
    out: Outbound,
}

#[derive(Default)]
struct HubInner {
    next_cursor: u64,
    ring: VecDeque<ObservedEvent>,
    subs: HashMap<SubId, HubSub>,
    next_sub: SubId,
}

/// The gateway's observed-event hub.
#[derive(Default)]
pub struct ObservedHub {
    inner: Mutex<HubInner>,
}

impl ObservedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next cursor, retain the event, and fan it out to every
    /// matching subscriber.
    pub fn publish(&self, scope: &Scope, payload: ObservedPayload) -> ObservedEvent {
        let mut inner = self.inner.lock();
        inner.next_cursor += 1;
        let event =
            ObservedEvent { cursor: inner.next_cursor, scope: scope.clone(), payload };

        inner.ring.push_back(event.clone());
        while inner.ring.len() > RING_CAPACITY {
            inner.ring.pop_front();
        }

        inner.subs.retain(|_, sub| {
            if !sub.matches(&event) {
                return !sub.out.is_closed();
            }
            sub.out.send(ServerEnvelope::StreamEvent { event: event.clone() })
        });
        event
    }

    /// Register a subscriber. Events after `after_cursor` still in the ring
    /// are replayed before registration, atomically with it.
    ///
    /// Returns the subscription id and the cursor as of registration.
    pub fn subscribe(
        &self,
        scope: &Scope,
        after_cursor: Option<u64>,
        key_events_only: bool,
        out: Outbound,
    ) -> (SubId, u64) {
        let mut inner = self.inner.lock();
        let sub = HubSub { scope: scope.clone(), key_events_only, out };

        if let Some(after) = after_cursor {
            for event in inner.ring.iter().filter(|e| e.cursor > after) {
                if sub.matches(event) {
                    sub.out.send(ServerEnvelope::StreamEvent { event: event.clone() });
                }
            }
        }

        inner.next_sub += 1;
        let id = inner.next_sub;
        let cursor = inner.next_cursor;
        inner.subs.insert(id, sub);
        (id, cursor)
    }

    pub fn unsubscribe(&self, id: SubId) {
        self.inner.lock().subs.remove(&id);
    }

    /// Drop every subscription belonging to a disconnected connection.
    pub fn remove_conn(&self, conn_id: ConnId) {
        self.inner.lock().subs.retain(|_, sub| sub.out.conn_id() != conn_id);
    }

    /// Current cursor value (for tests and status reporting).
    pub fn cursor(&self) -> u64 {
        self.inner.lock().next_cursor
    }
}

impl HubSub {
    fn matches(&self, event: &ObservedEvent) -> bool {
        if !self.scope.matches(&event.scope) {
            return false;
        }
        if self.key_events_only {
            return event.payload.is_key_event();
        }
        true
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
