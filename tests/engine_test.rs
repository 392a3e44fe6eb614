//! Integration tests for the preview engine.

use massmint_preview::collab::{GenerateRequest, GeneratedPreview, PreviewGenerator};
use massmint_preview::config::PipelineConfig;
use massmint_preview::engine::{PreviewEngine, Routed, Session};
use massmint_preview::error::Error;
use massmint_preview::event::{EventKind, IgnoreReason};
use massmint_preview::model::{
    EntropyRange, Hash, ImageDataPayload, MetadataRef, RenderState, WorkItem,
};
use serde_json::json;

const FAILED: &str = "data:,";

struct StubGenerator;

impl PreviewGenerator for StubGenerator {
    fn generate(&self, request: &GenerateRequest<'_>) -> GeneratedPreview {
        GeneratedPreview {
            image: format!(
                "regen:{}:{}:{}",
                request.entropy_range.0, request.account_id, request.content
            ),
        }
    }
}

fn item(n: u64) -> WorkItem {
    WorkItem::new(format!("h{n}"), EntropyRange(n * 10, n * 10 + 9), format!("placeholder-{n}"))
        .name("Drop")
        .collection_name("Collection")
        .price("100")
}

fn items(n: u64) -> Vec<WorkItem> {
    (1..=n).map(item).collect()
}

fn engine_with(config: PipelineConfig) -> PreviewEngine<StubGenerator> {
    PreviewEngine::new(&config, Session::new("acct", "content-cid"), StubGenerator)
}

fn test_engine() -> PreviewEngine<StubGenerator> {
    engine_with(PipelineConfig::default())
}

fn success(hash: &str) -> ImageDataPayload {
    ImageDataPayload::new(hash, format!("data:image/png;base64,{hash}"))
        .with_field("animationUrl", json!(format!("ipfs://{hash}")))
}

fn failure(hash: &str) -> ImageDataPayload {
    ImageDataPayload::new(hash, FAILED)
}

fn hashes(items: &[std::sync::Arc<WorkItem>]) -> Vec<String> {
    items.iter().map(|i| i.hash.to_string()).collect()
}

fn snapshot(engine: &PreviewEngine<StubGenerator>) -> Vec<WorkItem> {
    engine.items().iter().map(|i| (**i).clone()).collect()
}

// ---------------------------------------------------------------------------
// Throttled dispatch
// ---------------------------------------------------------------------------

#[test]
fn initial_pass_fills_the_ceiling() {
    let mut engine = test_engine();

    let dispatched = engine.begin_session(items(5));

    assert_eq!(hashes(&dispatched), vec!["h1", "h2", "h3"]);
    let in_flight = engine.items().iter().filter(|i| i.can_render).count();
    assert_eq!(in_flight, 3);
    assert_eq!(engine.counters().rendering, 3);
    assert_eq!(engine.counters().to_render, 5);
}

#[test]
fn completion_backfills_next_item() {
    let mut engine = test_engine();
    engine.begin_session(items(5));

    let completion = engine.on_completion(success("h1"));

    assert_eq!(completion.routed, Routed::Completed(Hash::from("h1")));
    assert_eq!(hashes(&completion.dispatched), vec!["h4"]);
    assert_eq!(engine.counters().rendering, 3);
    assert_eq!(engine.counters().to_render, 4);
}

#[test]
fn fewer_items_than_ceiling_dispatches_all() {
    let mut engine = test_engine();
    let dispatched = engine.begin_session(items(2));
    assert_eq!(hashes(&dispatched), vec!["h1", "h2"]);

    engine.on_completion(success("h1"));
    let completion = engine.on_completion(success("h2"));
    assert!(completion.dispatched.is_empty());
    assert!(engine.is_settled());
}

#[test]
fn custom_ceiling_is_respected() {
    let mut engine = engine_with(PipelineConfig {
        max_in_flight: 1,
        ..PipelineConfig::default()
    });
    let dispatched = engine.begin_session(items(3));
    assert_eq!(hashes(&dispatched), vec!["h1"]);

    let completion = engine.on_completion(success("h1"));
    assert_eq!(hashes(&completion.dispatched), vec!["h2"]);
}

#[test]
fn in_flight_never_exceeds_ceiling() {
    let mut engine = test_engine();
    engine.begin_session(items(20));

    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut step = 0u32;
    while !engine.is_settled() && step < 1_000 {
        step += 1;
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let in_flight: Vec<_> = engine.items().into_iter().filter(|i| i.is_in_flight()).collect();
        assert!(!in_flight.is_empty(), "unsettled engine with nothing in flight");
        let pick = &in_flight[(state >> 33) as usize % in_flight.len()];

        let payload = if step % 4 == 0 && step < 40 {
            failure(pick.hash.as_str())
        } else {
            success(pick.hash.as_str())
        };
        let completion = engine.on_completion(payload);

        assert!(completion.dispatched.len() <= 1);
        assert!(engine.counters().rendering <= engine.ceiling());
    }

    assert!(engine.is_settled());
    assert_eq!(engine.rendered_items().len(), 20);
}

#[test]
fn paused_rendering_holds_dispatch_until_resumed() {
    let mut engine = test_engine();
    engine.begin_session(items(5));
    assert!(engine.set_rendering(false).is_empty());

    let completion = engine.on_completion(success("h1"));
    assert!(completion.dispatched.is_empty());
    assert_eq!(engine.counters().rendering, 2);

    let resumed = engine.set_rendering(true);
    assert_eq!(hashes(&resumed), vec!["h4"]);
    assert!(engine.is_rendering());
}

// ---------------------------------------------------------------------------
// Completion routing
// ---------------------------------------------------------------------------

#[test]
fn success_attaches_payload_and_keeps_other_fields() {
    let mut engine = test_engine();
    engine.begin_session(items(3));
    let before = engine.get(&Hash::from("h2")).unwrap();

    let payload = success("h2");
    engine.on_completion(payload.clone());

    let after = engine.get(&Hash::from("h2")).unwrap();
    let mut expected = (*before).clone();
    expected.image_data_payload = Some(payload);
    assert_eq!(*after, expected);
    assert_eq!(after.state(), RenderState::Rendered);
}

#[test]
fn failure_marker_regenerates_and_frees_slot() {
    let mut engine = test_engine();
    engine.begin_session(items(5));
    let before = engine.counters();
    let seq = engine.last_event_seq();

    let completion = engine.on_completion(failure("h2"));

    assert_eq!(
        completion.routed,
        Routed::Regenerated {
            hash: Hash::from("h2"),
            attempt: 1
        }
    );
    // The freed slot goes to the first eligible item, which is h2 itself.
    assert_eq!(hashes(&completion.dispatched), vec!["h2"]);

    let regenerated = engine.get(&Hash::from("h2")).unwrap();
    assert_eq!(regenerated.image, "regen:20:acct:content-cid");
    assert!(regenerated.image_data_payload.is_none());
    assert_eq!(regenerated.regenerations, 1);
    assert_eq!(regenerated.entropy_range, EntropyRange(20, 29));
    assert_eq!(engine.counters(), before);

    // h2 leaves the in-flight set before the throttle hands the slot back.
    let h2 = Hash::from("h2");
    let kinds: Vec<_> = engine.events_since(seq).map(|e| e.kind.clone()).collect();
    let released = kinds
        .iter()
        .position(|k| {
            matches!(k, EventKind::StateTransition { hash, from: RenderState::Dispatched, to: RenderState::Pending } if *hash == h2)
        })
        .expect("h2 returned to pending");
    let redispatched = kinds
        .iter()
        .position(|k| matches!(k, EventKind::RenderDispatched { hash, .. } if *hash == h2))
        .expect("h2 dispatched again");
    assert!(released < redispatched);
    assert!(matches!(
        &kinds[redispatched],
        EventKind::RenderDispatched { rendering: 3, to_render: 5, .. }
    ));
}

#[test]
fn regeneration_drops_metadata_of_discarded_image() {
    let mut engine = test_engine();
    engine.begin_session(items(2));
    engine.on_completion(success("h1"));
    engine.on_completion(success("h2"));
    for hash in ["h1", "h2"] {
        engine
            .attach_metadata(&Hash::from(hash), MetadataRef("ipfs://old".into()))
            .unwrap();
    }
    assert!(engine.all_pinned());

    engine.on_completion(failure("h1"));

    let h1 = engine.get(&Hash::from("h1")).unwrap();
    assert!(h1.metadata.is_none());
    assert!(h1.image_data_payload.is_none());
    assert!(!engine.all_pinned());

    engine.on_completion(success("h1"));
    let h1 = engine.get(&Hash::from("h1")).unwrap();
    assert!(h1.is_rendered());
    assert!(h1.metadata.is_none());
    let unpinned: Vec<_> = engine
        .rendered_items()
        .iter()
        .filter(|i| i.metadata.is_none())
        .map(|i| i.hash.to_string())
        .collect();
    assert_eq!(unpinned, vec!["h1"]);
}

#[test]
fn exhaustion_drops_metadata() {
    let mut engine = engine_with(PipelineConfig {
        max_regenerations: Some(0),
        ..PipelineConfig::default()
    });
    engine.begin_session(items(1));
    engine.on_completion(success("h1"));
    engine
        .attach_metadata(&Hash::from("h1"), MetadataRef("ipfs://old".into()))
        .unwrap();

    let completion = engine.on_completion(failure("h1"));

    assert!(matches!(completion.routed, Routed::Exhausted { .. }));
    assert!(engine.get(&Hash::from("h1")).unwrap().metadata.is_none());
    assert!(!engine.all_pinned());
}

#[test]
fn failure_after_success_clears_payload() {
    let mut engine = test_engine();
    engine.begin_session(items(3));
    engine.on_completion(success("h1"));
    assert!(engine.get(&Hash::from("h1")).unwrap().is_rendered());

    engine.on_completion(failure("h1"));

    let item = engine.get(&Hash::from("h1")).unwrap();
    assert!(item.image_data_payload.is_none());
    assert!(item.image.starts_with("regen:10"));
}

#[test]
fn regeneration_is_unbounded_by_default() {
    let mut engine = test_engine();
    engine.begin_session(items(1));

    for attempt in 1..=25 {
        let completion = engine.on_completion(failure("h1"));
        assert_eq!(
            completion.routed,
            Routed::Regenerated {
                hash: Hash::from("h1"),
                attempt
            }
        );
        assert_eq!(hashes(&completion.dispatched), vec!["h1"]);
    }
    assert_eq!(engine.get(&Hash::from("h1")).unwrap().state(), RenderState::Dispatched);
}

#[test]
fn regeneration_limit_marks_item_failed() {
    let mut engine = engine_with(PipelineConfig {
        max_regenerations: Some(1),
        ..PipelineConfig::default()
    });
    engine.begin_session(items(5));

    let first = engine.on_completion(failure("h1"));
    assert!(matches!(first.routed, Routed::Regenerated { attempt: 1, .. }));
    assert_eq!(hashes(&first.dispatched), vec!["h1"]);

    let second = engine.on_completion(failure("h1"));
    assert_eq!(
        second.routed,
        Routed::Exhausted {
            hash: Hash::from("h1"),
            attempts: 1
        }
    );
    assert_eq!(hashes(&second.dispatched), vec!["h4"]);

    let failed = engine.get(&Hash::from("h1")).unwrap();
    assert_eq!(failed.state(), RenderState::Failed);
    assert_eq!(engine.counters().to_render, 4);

    let third = engine.on_completion(failure("h1"));
    assert_eq!(
        third.routed,
        Routed::Ignored {
            hash: Hash::from("h1"),
            reason: IgnoreReason::Exhausted
        }
    );
}

#[test]
fn unmatched_hash_is_noop() {
    let mut engine = test_engine();
    engine.begin_session(items(3));
    let before = snapshot(&engine);

    let completion = engine.on_completion(success("unknown"));

    assert!(matches!(
        completion.routed,
        Routed::Ignored {
            reason: IgnoreReason::Unmatched,
            ..
        }
    ));
    assert!(completion.dispatched.is_empty());
    assert_eq!(snapshot(&engine), before);
    assert!(engine.pending_payloads().get(&Hash::from("unknown")).is_some());
}

#[test]
fn completion_before_session_is_recorded_only() {
    let mut engine = test_engine();

    let completion = engine.on_completion(success("h1"));

    assert!(matches!(
        completion.routed,
        Routed::Ignored {
            reason: IgnoreReason::NotStarted,
            ..
        }
    ));
    assert!(engine.items().is_empty());
    let recorded = engine.pending_payloads().get(&Hash::from("h1")).unwrap();
    assert_eq!(recorded.payload, success("h1"));
}

#[test]
fn completion_after_session_end_is_recorded_only() {
    let mut engine = test_engine();
    engine.begin_session(items(3));
    engine.on_completion(success("h1"));
    engine.end_session(vec![Hash::from("h1")]);
    let before = snapshot(&engine);

    let late_success = engine.on_completion(success("h2"));
    let late_failure = engine.on_completion(failure("h3"));

    for routed in [late_success.routed, late_failure.routed] {
        assert!(matches!(
            routed,
            Routed::Ignored {
                reason: IgnoreReason::Ended,
                ..
            }
        ));
    }
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.pending_payloads().len(), 3);
    assert_eq!(
        engine.pending_payloads().get(&Hash::from("h3")).unwrap().payload.image,
        FAILED
    );
}

#[test]
fn pending_payloads_are_last_write_wins() {
    let mut engine = test_engine();
    engine.begin_session(items(2));

    engine.on_completion(failure("h1"));
    engine.on_completion(success("h1"));

    let recorded = engine.pending_payloads().get(&Hash::from("h1")).unwrap();
    assert_eq!(recorded.payload, success("h1"));
    assert_eq!(engine.pending_payloads().len(), 1);
}

#[test]
fn new_session_accepts_completions_again() {
    let mut engine = test_engine();
    engine.begin_session(items(2));
    engine.end_session(vec![Hash::from("h1")]);
    assert!(engine.session().has_ended());

    let first_id = engine.session_id();
    engine.begin_session(items(2));
    assert!(!engine.session().has_ended());
    assert_ne!(engine.session_id(), first_id);
    let completion = engine.on_completion(success("h1"));
    assert_eq!(completion.routed, Routed::Completed(Hash::from("h1")));
}

#[test]
fn reset_drops_targets_but_keeps_diagnostics() {
    let mut engine = test_engine();
    engine.begin_session(items(2));
    engine.on_completion(success("h1"));

    engine.reset();

    assert!(engine.items().is_empty());
    assert!(!engine.is_rendering());
    assert!(engine.session_id().is_none());
    assert_eq!(engine.pending_payloads().len(), 1);
}

// ---------------------------------------------------------------------------
// Metadata and events
// ---------------------------------------------------------------------------

#[test]
fn all_pinned_requires_metadata_on_every_item() {
    let mut engine = test_engine();
    assert!(!engine.all_pinned());

    engine.begin_session(items(2));
    engine
        .attach_metadata(&Hash::from("h1"), MetadataRef("ipfs://m1".into()))
        .unwrap();
    assert!(!engine.all_pinned());

    engine
        .attach_metadata(&Hash::from("h2"), MetadataRef("ipfs://m2".into()))
        .unwrap();
    assert!(engine.all_pinned());
}

#[test]
fn attach_metadata_to_unknown_hash_fails() {
    let mut engine = test_engine();
    engine.begin_session(items(1));

    let err = engine
        .attach_metadata(&Hash::from("nope"), MetadataRef("ipfs://x".into()))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(h) if h == Hash::from("nope")));
}

#[test]
fn events_record_dispatch_and_completion() {
    let mut engine = test_engine();
    engine.begin_session(items(4));

    let events: Vec<_> = engine.events_since(0).collect();
    assert!(matches!(events[0].kind, EventKind::SessionStarted { items: 4, .. }));
    let dispatched: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::RenderDispatched { hash, rendering, .. } => Some((hash.to_string(), *rendering)),
            _ => None,
        })
        .collect();
    assert_eq!(
        dispatched,
        vec![("h1".to_string(), 1), ("h2".to_string(), 2), ("h3".to_string(), 3)]
    );

    let seq = events.last().unwrap().seq;
    engine.on_completion(success("h2"));
    let new_events: Vec<_> = engine.events_since(seq).collect();
    assert!(new_events.iter().all(|e| e.seq > seq));
    assert!(new_events.iter().any(|e| matches!(
        &e.kind,
        EventKind::StateTransition {
            from: RenderState::Dispatched,
            to: RenderState::Rendered,
            ..
        }
    )));
    assert!(new_events.iter().any(|e| matches!(
        &e.kind,
        EventKind::RenderDispatched { hash, .. } if *hash == Hash::from("h4")
    )));
}

#[test]
fn event_log_is_bounded_under_endless_failures() {
    let mut engine = engine_with(PipelineConfig {
        event_capacity: 16,
        ..PipelineConfig::default()
    });
    engine.begin_session(items(3));

    for _ in 0..100 {
        engine.on_completion(failure("h1"));
    }

    let retained: Vec<_> = engine.events_since(0).collect();
    assert_eq!(retained.len(), 16);
    let last = engine.last_event_seq();
    assert!(last > 16);
    assert_eq!(retained.last().unwrap().seq, last);
    assert_eq!(retained.first().unwrap().seq, last - 15);
    assert!(retained.windows(2).all(|w| w[1].seq == w[0].seq + 1));

    assert_eq!(engine.events_since(last - 3).count(), 3);
    assert_eq!(engine.events_since(last).count(), 0);
}

#[test]
fn reset_clears_events_and_keeps_numbering() {
    let mut engine = test_engine();
    engine.begin_session(items(3));
    let seq = engine.last_event_seq();
    assert!(seq > 0);

    engine.reset();
    assert_eq!(engine.events_since(0).count(), 0);
    assert_eq!(engine.last_event_seq(), seq);

    engine.begin_session(items(1));
    let first = engine.events_since(0).next().unwrap();
    assert_eq!(first.seq, seq + 1);
    assert!(matches!(first.kind, EventKind::SessionStarted { items: 1, .. }));
}
