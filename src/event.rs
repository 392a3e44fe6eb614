//! Structured events emitted by the engine on every state transition.
//!
//! Consumers read the event log to build progress views or audit a session.
//! Events are the engine's record; tracing output is its voice.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::model::{Hash, MetadataRef, RenderState};

/// A structured event emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number, starting at 1. Consumers can detect gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

/// Why a completion had no effect on the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// No target list yet.
    NotStarted,
    /// Session items already recorded.
    Ended,
    /// Hash not in the registry.
    Unmatched,
    /// Item already gave up after too many regenerations.
    Exhausted,
}

impl IgnoreReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IgnoreReason::NotStarted => "not_started",
            IgnoreReason::Ended => "ended",
            IgnoreReason::Unmatched => "unmatched",
            IgnoreReason::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted {
        session_id: Uuid,
        items: usize,
    },
    SessionEnded {
        minted: usize,
    },
    RenderDispatched {
        hash: Hash,
        rendering: usize,
        to_render: usize,
    },
    RenderCompleted {
        hash: Hash,
    },
    RenderRegenerated {
        hash: Hash,
        attempt: u32,
    },
    RenderExhausted {
        hash: Hash,
        attempts: u32,
    },
    CompletionIgnored {
        hash: Hash,
        reason: IgnoreReason,
    },
    MetadataAttached {
        hash: Hash,
        metadata: MetadataRef,
    },
    StateTransition {
        hash: Hash,
        from: RenderState,
        to: RenderState,
    },
}

/// Bounded event log with sequence numbering.
///
/// Holds at most `capacity` events; the oldest are dropped first. Sequence
/// numbers keep counting across drops and clears, so `since` stays valid.
#[derive(Debug)]
pub struct EventLog {
    events: VecDeque<Event>,
    capacity: usize,
    last_seq: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that retains at most `capacity` events (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            last_seq: 0,
        }
    }

    pub fn record(&mut self, kind: EventKind) -> &Event {
        self.last_seq += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event {
            seq: self.last_seq,
            timestamp: Utc::now(),
            kind,
        });
        &self.events[self.events.len() - 1]
    }

    /// Retained events with `seq > since_seq`, oldest first.
    pub fn since(&self, since_seq: u64) -> impl Iterator<Item = &Event> {
        let first = self.last_seq + 1 - self.events.len() as u64;
        let skip = since_seq.saturating_sub(first - 1).min(self.events.len() as u64);
        self.events.iter().skip(skip as usize)
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop retained events. Numbering continues from `last_seq`.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
