//! Dispatch throttle.
//!
//! Watches the two derived counters and releases at most one item per
//! observed change, never letting the number of in-flight renders exceed
//! the ceiling.

use crate::model::Hash;
use crate::registry::Registry;

/// Derived counts over the registry. Never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    /// Dispatched and still waiting for a result.
    pub rendering: usize,
    /// Not yet rendered, in flight or not. Failed items are excluded.
    pub to_render: usize,
}

impl Counters {
    pub fn of(registry: &Registry) -> Self {
        registry.all().fold(Self::default(), |mut acc, item| {
            if item.is_in_flight() {
                acc.rendering += 1;
            }
            if !item.is_rendered() && !item.exhausted {
                acc.to_render += 1;
            }
            acc
        })
    }
}

#[derive(Debug)]
pub struct DispatchThrottle {
    ceiling: usize,
    last_observed: Option<Counters>,
}

impl DispatchThrottle {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            last_observed: None,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Forget the last observation so the next evaluation always runs.
    pub fn reset(&mut self) {
        self.last_observed = None;
    }

    /// Run the dispatch rule if the counters changed since the last call.
    ///
    /// Returns the hash to release, if any. The caller marks it dispatched;
    /// that mutation changes the counters, and the next call evaluates again.
    pub fn evaluate(&mut self, registry: &Registry, active: bool) -> Option<Hash> {
        let counters = Counters::of(registry);
        if self.last_observed == Some(counters) {
            return None;
        }
        self.last_observed = Some(counters);
        self.select(registry, counters, active)
    }

    /// The dispatch rule on its own: first eligible item in registry order,
    /// when rendering is active, work remains and a slot is free.
    pub fn select(&self, registry: &Registry, counters: Counters, active: bool) -> Option<Hash> {
        if !active || counters.to_render == 0 || counters.rendering >= self.ceiling {
            return None;
        }
        // All remaining items may already be in flight. Nothing to do then.
        registry
            .find(|item| item.is_eligible())
            .map(|item| item.hash.clone())
    }
}
