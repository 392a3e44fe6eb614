//! Finalization: pin rendered previews and assemble their metadata.

use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, info, warn};

use crate::collab::{Capture, CaptureRequest, MetadataAssembler, MetadataRequest, PreviewGenerator};
use crate::error::Result;
use crate::model::{DropInfo, Hash, MetadataRef, MintCandidate, WorkItem};
use crate::telemetry::metrics;
use crate::telemetry::render::start_finalize_span;

use super::preview::PreviewEngine;

/// Drives capture and metadata assembly for rendered items.
pub struct Finalizer<C, M> {
    capture: C,
    assembler: M,
    drop: DropInfo,
    content_type: String,
}

impl<C: Capture, M: MetadataAssembler> Finalizer<C, M> {
    pub fn new(capture: C, assembler: M, drop: DropInfo, content_type: impl Into<String>) -> Self {
        Self {
            capture,
            assembler,
            drop,
            content_type: content_type.into(),
        }
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn assembler(&self) -> &M {
        &self.assembler
    }

    pub fn drop_info(&self) -> &DropInfo {
        &self.drop
    }

    /// Capture the item's rendered image, then assemble its metadata.
    ///
    /// Errors from either step are returned as raised; there is no retry here.
    pub async fn pin_and_describe(&self, item: &WorkItem) -> Result<MetadataRef> {
        let image = item.image.as_str();
        let content_id = self
            .capture
            .try_capture(CaptureRequest {
                image,
                data: item.image_data_payload.as_ref(),
            })
            .await?;

        let display_name = item
            .collection_name
            .as_deref()
            .unwrap_or_else(|| self.drop.display_name());

        self.assembler
            .assemble(MetadataRequest {
                content_id: &content_id,
                description: self.drop.description.as_deref().unwrap_or_default(),
                display_name,
                content_type: &self.content_type,
                image,
            })
            .await
    }

    /// Pin every rendered item that has no metadata yet and attach the result.
    ///
    /// One outcome per attempted item, in session order. A failure leaves
    /// that item untouched and does not stop the others.
    pub async fn finalize_rendered<G: PreviewGenerator>(
        &self,
        engine: &mut PreviewEngine<G>,
    ) -> Vec<(Hash, Result<MetadataRef>)> {
        let pending: Vec<_> = engine
            .rendered_items()
            .into_iter()
            .filter(|item| item.metadata.is_none())
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        for item in pending {
            let span = start_finalize_span(&item.hash);
            let start = Instant::now();
            let result = self.pin_and_describe(&item).instrument(span).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            let status = if result.is_ok() { "ok" } else { "error" };
            metrics::finalize_duration_ms().record(elapsed_ms, &[KeyValue::new("result", status)]);

            match &result {
                Ok(metadata) => {
                    info!(hash = %item.hash, %metadata, elapsed_ms, "preview pinned");
                    if let Err(e) = engine.attach_metadata(&item.hash, metadata.clone()) {
                        warn!(hash = %item.hash, "attach metadata: {e}");
                    }
                }
                Err(e) => warn!(hash = %item.hash, error = %e, "finalization failed"),
            }
            outcomes.push((item.hash.clone(), result));
        }
        outcomes
    }

    /// Normalize finished previews for the minting phase.
    pub fn mint_candidates<'a>(&self, items: impl IntoIterator<Item = &'a WorkItem>) -> Vec<MintCandidate> {
        project_to_mint_candidates(items, &self.drop)
    }
}

/// Map finished previews to mint candidates, preserving order.
///
/// Name, collection name and price come from the drop. `can_render` is
/// always reset for the next phase.
pub fn project_to_mint_candidates<'a>(
    items: impl IntoIterator<Item = &'a WorkItem>,
    drop: &DropInfo,
) -> Vec<MintCandidate> {
    items
        .into_iter()
        .map(|item| MintCandidate {
            name: drop.name.clone(),
            collection_name: drop.collection_name.clone().unwrap_or_default(),
            image: item.image.clone(),
            price: drop.price.clone(),
            hash: item.hash.clone(),
            entropy_range: item.entropy_range,
            can_render: false,
        })
        .collect()
}
