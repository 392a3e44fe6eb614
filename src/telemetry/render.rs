//! Span helpers for items moving through the render pipeline.

use tracing::Span;

use crate::model::{EntropyRange, Hash, RenderState};

/// Span for a render state change on one item.
pub fn start_render_span(hash: &Hash, entropy_range: &EntropyRange) -> Span {
    tracing::info_span!(
        "preview.render",
        "preview.hash" = %hash,
        "preview.entropy_range" = %entropy_range,
    )
}

/// Span for capture and metadata assembly of one item.
pub fn start_finalize_span(hash: &Hash) -> Span {
    tracing::info_span!("preview.finalize", "preview.hash" = %hash)
}

/// Emit a state transition event scoped to the given span.
pub fn record_state_transition(span: &Span, from: RenderState, to: RenderState) {
    span.in_scope(|| {
        tracing::info!(%from, %to, "state_transition");
    });
}
