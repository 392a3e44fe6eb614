//! Completion router: matches render results to work items by hash.
//!
//! Every payload is recorded for diagnostics first. Payloads outside the
//! session window or for unknown hashes stop there. A failure marker
//! triggers synchronous regeneration of the item and drops any payload or
//! metadata tied to the old image; anything else attaches the payload.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::collab::{GenerateRequest, PreviewGenerator};
use crate::event::IgnoreReason;
use crate::model::{Hash, ImageDataPayload, WorkItem};
use crate::registry::Registry;

use super::session::Session;

/// Last payload received for a hash, kept regardless of session state.
#[derive(Debug, Clone)]
pub struct PendingPayload {
    pub payload: ImageDataPayload,
    pub received_at: DateTime<Utc>,
}

/// Diagnostics map of raw payloads. Last write wins per hash.
#[derive(Debug, Default)]
pub struct PendingPayloads {
    entries: HashMap<Hash, PendingPayload>,
}

impl PendingPayloads {
    pub fn record(&mut self, payload: ImageDataPayload) {
        self.entries.insert(
            payload.hash.clone(),
            PendingPayload {
                payload,
                received_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, hash: &Hash) -> Option<&PendingPayload> {
        self.entries.get(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash, &PendingPayload)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What routing a completion did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Payload attached to the item.
    Completed(Hash),
    /// Failure marker received; item re-derived and made eligible again.
    Regenerated { hash: Hash, attempt: u32 },
    /// Failure marker received past the regeneration limit; item gave up.
    Exhausted { hash: Hash, attempts: u32 },
    /// No registry effect.
    Ignored { hash: Hash, reason: IgnoreReason },
}

#[derive(Debug)]
pub struct CompletionRouter {
    pending: PendingPayloads,
    failure_marker: String,
    max_regenerations: Option<u32>,
}

impl CompletionRouter {
    pub fn new(failure_marker: impl Into<String>, max_regenerations: Option<u32>) -> Self {
        Self {
            pending: PendingPayloads::default(),
            failure_marker: failure_marker.into(),
            max_regenerations,
        }
    }

    pub fn pending(&self) -> &PendingPayloads {
        &self.pending
    }

    /// Route one completion.
    pub fn route<G: PreviewGenerator>(
        &mut self,
        payload: ImageDataPayload,
        registry: &mut Registry,
        session: &Session,
        generator: &G,
    ) -> Routed {
        self.pending.record(payload.clone());
        let hash = payload.hash.clone();

        let ignored = |reason| {
            debug!(%hash, ?reason, "completion ignored");
            Routed::Ignored {
                hash: hash.clone(),
                reason,
            }
        };

        if registry.is_empty() {
            return ignored(IgnoreReason::NotStarted);
        }
        if session.has_ended() {
            return ignored(IgnoreReason::Ended);
        }
        let Some(current) = registry.get(&hash) else {
            return ignored(IgnoreReason::Unmatched);
        };

        if !payload.is_failure(&self.failure_marker) {
            info!(%hash, "render completed");
            registry.upsert(&hash, |item| WorkItem {
                image_data_payload: Some(payload),
                ..item.clone()
            });
            return Routed::Completed(hash);
        }

        if current.exhausted {
            return ignored(IgnoreReason::Exhausted);
        }

        let attempt = current.regenerations + 1;
        if self.max_regenerations.is_some_and(|max| attempt > max) {
            warn!(%hash, attempts = current.regenerations, "render failed, regeneration limit reached");
            registry.upsert(&hash, |item| WorkItem {
                image_data_payload: None,
                metadata: None,
                can_render: false,
                exhausted: true,
                ..item.clone()
            });
            return Routed::Exhausted {
                hash,
                attempts: current.regenerations,
            };
        }

        warn!(
            %hash,
            entropy_range = %current.entropy_range,
            attempt,
            "render failed, regenerating"
        );
        let generated = generator.generate(&GenerateRequest {
            entropy_range: current.entropy_range,
            account_id: &session.account_id,
            content: &session.content,
        });
        registry.upsert(&hash, |item| WorkItem {
            image: generated.image,
            image_data_payload: None,
            metadata: None,
            can_render: false,
            regenerations: attempt,
            ..item.clone()
        });
        Routed::Regenerated { hash, attempt }
    }
}
