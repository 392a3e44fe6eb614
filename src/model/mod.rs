//! Core data model.
//!
//! A work item is one preview that needs rendering. It has identity (the
//! content hash), a deterministic input (the entropy range), the last known
//! image reference, and the payload reported once a render succeeds.

pub mod item;
pub mod mint;

pub use item::{EntropyRange, Hash, ImageDataPayload, RenderState, WorkItem};
pub use mint::{DropInfo, MetadataRef, MintCandidate};
