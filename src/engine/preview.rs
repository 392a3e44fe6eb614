//! Preview engine. The public API for driving a mass-mint render session.
//!
//! The engine owns the registry, the session signals, the payload
//! diagnostics and the throttle. Every mutation goes through here and is
//! followed by a throttle pass, so dispatch decisions are made explicitly
//! after each state change rather than by watchers.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::info;
use uuid::Uuid;

use crate::collab::PreviewGenerator;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventLog};
use crate::model::{Hash, ImageDataPayload, MetadataRef, RenderState, WorkItem};
use crate::registry::Registry;
use crate::telemetry::metrics;
use crate::telemetry::render::{record_state_transition, start_render_span};

use super::router::{CompletionRouter, PendingPayloads, Routed};
use super::session::Session;
use super::throttle::{Counters, DispatchThrottle};

/// Result of feeding one completion to the engine.
#[derive(Debug)]
pub struct Completion {
    pub routed: Routed,
    /// Items released by the throttle as a consequence.
    pub dispatched: Vec<Arc<WorkItem>>,
}

/// The preview engine. Owns all render state and enforces its invariants.
pub struct PreviewEngine<G> {
    registry: Registry,
    throttle: DispatchThrottle,
    router: CompletionRouter,
    session: Session,
    generator: G,
    events: EventLog,
    rendering_active: bool,
    session_id: Option<Uuid>,
}

impl<G: PreviewGenerator> PreviewEngine<G> {
    pub fn new(config: &PipelineConfig, session: Session, generator: G) -> Self {
        Self {
            registry: Registry::new(),
            throttle: DispatchThrottle::new(config.max_in_flight),
            router: CompletionRouter::new(&config.failure_marker, config.max_regenerations),
            session,
            generator,
            events: EventLog::with_capacity(config.event_capacity),
            rendering_active: false,
            session_id: None,
        }
    }

    /// Load the session's target list and start rendering.
    ///
    /// Replaces any previous target list. Returns the items released by the
    /// initial throttle pass.
    pub fn begin_session(&mut self, items: impl IntoIterator<Item = WorkItem>) -> Vec<Arc<WorkItem>> {
        let session_id = Uuid::new_v4();
        self.registry = Registry::from_items(items);
        self.session.minted.clear();
        self.session_id = Some(session_id);
        self.rendering_active = true;
        self.throttle.reset();

        info!(%session_id, items = self.registry.len(), "minting session started");
        self.events.record(EventKind::SessionStarted {
            session_id,
            items: self.registry.len(),
        });

        self.settle()
    }

    /// Record the minted items. Later completions no longer touch the registry.
    pub fn end_session(&mut self, minted: Vec<Hash>) {
        info!(minted = minted.len(), "minting session ended");
        self.events.record(EventKind::SessionEnded {
            minted: minted.len(),
        });
        self.session.minted = minted;
    }

    /// Drop the target list, the retained events and all session state
    /// except the payload diagnostics. Event numbering continues.
    pub fn reset(&mut self) {
        self.registry.clear();
        self.events.clear();
        self.session.minted.clear();
        self.session_id = None;
        self.rendering_active = false;
        self.throttle.reset();
    }

    /// Turn dispatching on or off. Turning it on runs a throttle pass.
    pub fn set_rendering(&mut self, active: bool) -> Vec<Arc<WorkItem>> {
        if self.rendering_active == active {
            return Vec::new();
        }
        self.rendering_active = active;
        self.throttle.reset();
        self.settle()
    }

    /// Route a render result and re-run the throttle.
    pub fn on_completion(&mut self, payload: ImageDataPayload) -> Completion {
        let before = self.registry.get(&payload.hash).map(|item| item.state());

        let routed = self
            .router
            .route(payload, &mut self.registry, &self.session, &self.generator);

        match &routed {
            Routed::Completed(hash) => {
                metrics::renders_completed().add(1, &[]);
                self.events.record(EventKind::RenderCompleted { hash: hash.clone() });
            }
            Routed::Regenerated { hash, attempt } => {
                metrics::renders_regenerated().add(1, &[]);
                self.events.record(EventKind::RenderRegenerated {
                    hash: hash.clone(),
                    attempt: *attempt,
                });
            }
            Routed::Exhausted { hash, attempts } => {
                metrics::renders_exhausted().add(1, &[]);
                self.events.record(EventKind::RenderExhausted {
                    hash: hash.clone(),
                    attempts: *attempts,
                });
            }
            Routed::Ignored { hash, reason } => {
                metrics::completions_ignored().add(1, &[KeyValue::new("reason", reason.as_str())]);
                self.events.record(EventKind::CompletionIgnored {
                    hash: hash.clone(),
                    reason: *reason,
                });
            }
        }

        if let Routed::Completed(hash) | Routed::Regenerated { hash, .. } | Routed::Exhausted { hash, .. } =
            &routed
        {
            self.record_transition(hash, before);
        }

        let dispatched = self.settle();
        Completion { routed, dispatched }
    }

    /// Store finalization output on an item.
    pub fn attach_metadata(&mut self, hash: &Hash, metadata: MetadataRef) -> Result<()> {
        let attached = self.registry.upsert(hash, |item| WorkItem {
            metadata: Some(metadata.clone()),
            ..item.clone()
        });
        if !attached {
            return Err(Error::NotFound(hash.clone()));
        }
        self.events.record(EventKind::MetadataAttached {
            hash: hash.clone(),
            metadata,
        });
        Ok(())
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<WorkItem>> {
        self.registry.get(hash)
    }

    /// Snapshot of every item in session order.
    pub fn items(&self) -> Vec<Arc<WorkItem>> {
        self.registry.snapshot()
    }

    /// Items with a payload, in session order.
    pub fn rendered_items(&self) -> Vec<Arc<WorkItem>> {
        self.registry
            .all()
            .filter(|item| item.is_rendered())
            .cloned()
            .collect()
    }

    pub fn counters(&self) -> Counters {
        Counters::of(&self.registry)
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering_active
    }

    /// Every item is rendered or has given up.
    pub fn is_settled(&self) -> bool {
        self.registry.all().all(|item| item.state().is_terminal())
    }

    /// Non-empty target list and every item carries metadata.
    pub fn all_pinned(&self) -> bool {
        !self.registry.is_empty() && self.registry.all().all(|item| item.metadata.is_some())
    }

    pub fn pending_payloads(&self) -> &PendingPayloads {
        self.router.pending()
    }

    /// Identifier of the current target list, if a session was started.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ceiling(&self) -> usize {
        self.throttle.ceiling()
    }

    /// Retained events with sequence number greater than `since_seq`.
    pub fn events_since(&self, since_seq: u64) -> impl Iterator<Item = &Event> {
        self.events.since(since_seq)
    }

    pub fn last_event_seq(&self) -> u64 {
        self.events.last_seq()
    }

    /// Apply the dispatch rule until the counters stop changing.
    ///
    /// Each dispatch changes the counters, which earns exactly one more
    /// evaluation. Terminates because every dispatch raises `rendering`.
    fn settle(&mut self) -> Vec<Arc<WorkItem>> {
        let mut dispatched = Vec::new();
        while let Some(hash) = self.throttle.evaluate(&self.registry, self.rendering_active) {
            if let Some(item) = self.dispatch(&hash) {
                dispatched.push(item);
            }
        }
        dispatched
    }

    fn dispatch(&mut self, hash: &Hash) -> Option<Arc<WorkItem>> {
        let applied = self.registry.upsert(hash, |item| WorkItem {
            can_render: true,
            ..item.clone()
        });
        if !applied {
            return None;
        }

        let counters = self.counters();
        info!(
            %hash,
            rendering = counters.rendering,
            to_render = counters.to_render,
            "starting to render"
        );
        metrics::renders_dispatched().add(1, &[]);
        self.events.record(EventKind::RenderDispatched {
            hash: hash.clone(),
            rendering: counters.rendering,
            to_render: counters.to_render,
        });
        self.record_transition(hash, Some(RenderState::Pending));

        self.registry.get(hash)
    }

    fn record_transition(&mut self, hash: &Hash, before: Option<RenderState>) {
        let (Some(from), Some(item)) = (before, self.registry.get(hash)) else {
            return;
        };
        let to = item.state();
        if from == to {
            return;
        }
        let span = start_render_span(hash, &item.entropy_range);
        record_state_transition(&span, from, to);
        self.events.record(EventKind::StateTransition {
            hash: hash.clone(),
            from,
            to,
        });
    }
}
