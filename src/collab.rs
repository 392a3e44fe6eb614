//! Contracts for the collaborators this crate drives but does not implement.
//!
//! The preview generator is synchronous and deterministic. Capture
//! (content-addressed storage) and metadata assembly are asynchronous and
//! may fail; their errors reach callers of finalization unchanged.

use std::future::Future;

use crate::error::Result;
use crate::model::{EntropyRange, ImageDataPayload, MetadataRef};

/// Input for re-deriving a preview.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub entropy_range: EntropyRange,
    /// Acting identity.
    pub account_id: &'a str,
    /// Drop content descriptor.
    pub content: &'a str,
}

/// Output of the preview generator.
#[derive(Debug, Clone)]
pub struct GeneratedPreview {
    /// Fresh image placeholder for the item.
    pub image: String,
}

/// Deterministic preview derivation.
pub trait PreviewGenerator {
    fn generate(&self, request: &GenerateRequest<'_>) -> GeneratedPreview;
}

impl<F> PreviewGenerator for F
where
    F: Fn(&GenerateRequest<'_>) -> GeneratedPreview,
{
    fn generate(&self, request: &GenerateRequest<'_>) -> GeneratedPreview {
        self(request)
    }
}

/// Input for capturing a rendered image.
#[derive(Debug, Clone, Copy)]
pub struct CaptureRequest<'a> {
    pub image: &'a str,
    /// `None` when the item was never rendered. Implementations are expected
    /// to fail in that case.
    pub data: Option<&'a ImageDataPayload>,
}

/// Content-addressed storage for rendered images.
pub trait Capture {
    /// Store the rendered image and return its content identifier.
    fn try_capture(&self, request: CaptureRequest<'_>) -> impl Future<Output = Result<String>> + Send;
}

/// Fields passed to metadata assembly.
#[derive(Debug, Clone, Copy)]
pub struct MetadataRequest<'a> {
    pub content_id: &'a str,
    pub description: &'a str,
    pub display_name: &'a str,
    pub content_type: &'a str,
    pub image: &'a str,
}

/// Builds and stores the metadata document for a captured image.
pub trait MetadataAssembler {
    fn assemble(&self, request: MetadataRequest<'_>) -> impl Future<Output = Result<MetadataRef>> + Send;
}
