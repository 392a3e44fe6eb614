//! Work items and render payloads.

use serde::{Deserialize, Serialize};

use super::mint::MetadataRef;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identity of a work item. Unique within a minting session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hash(pub String);

impl Hash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Hash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Hash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque deterministic input that drives how an item's image is generated.
/// Serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntropyRange(pub u64, pub u64);

impl std::fmt::Display for EntropyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.0, self.1)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Raw result reported by the rendering engine for one hash.
///
/// Only `hash` and `image` are interpreted here. Everything else the engine
/// reports is carried along untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDataPayload {
    pub hash: Hash,
    pub image: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ImageDataPayload {
    pub fn new(hash: impl Into<Hash>, image: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            image: image.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an engine-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// True when this payload carries the given failure marker instead of an image.
    pub fn is_failure(&self, marker: &str) -> bool {
        self.image == marker
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One preview unit tracked by the registry.
///
/// Items are never mutated in place once stored; every change produces a
/// new value that replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub hash: Hash,

    pub entropy_range: EntropyRange,

    /// Last known image reference, or a placeholder before rendering.
    pub image: String,

    /// Set only by a successful completion for this hash.
    pub image_data_payload: Option<ImageDataPayload>,

    /// Released by the throttle for the current render attempt.
    pub can_render: bool,

    pub name: String,
    pub collection_name: Option<String>,
    pub price: Option<String>,

    /// Metadata reference produced by finalization.
    pub metadata: Option<MetadataRef>,

    /// Number of regenerations caused by failed renders.
    pub regenerations: u32,

    /// Regeneration limit reached. No further dispatch.
    pub exhausted: bool,
}

impl WorkItem {
    pub fn new(hash: impl Into<Hash>, entropy_range: EntropyRange, image: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            entropy_range,
            image: image.into(),
            image_data_payload: None,
            can_render: false,
            name: String::new(),
            collection_name: None,
            price: None,
            metadata: None,
            regenerations: 0,
            exhausted: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn collection_name(mut self, collection_name: impl Into<String>) -> Self {
        self.collection_name = Some(collection_name.into());
        self
    }

    pub fn price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn is_rendered(&self) -> bool {
        self.image_data_payload.is_some()
    }

    /// Dispatched for the current attempt and still waiting for a result.
    pub fn is_in_flight(&self) -> bool {
        self.can_render && !self.is_rendered() && !self.exhausted
    }

    /// May be released by the throttle.
    pub fn is_eligible(&self) -> bool {
        !self.can_render && !self.is_rendered() && !self.exhausted
    }

    pub fn state(&self) -> RenderState {
        if self.is_rendered() {
            RenderState::Rendered
        } else if self.exhausted {
            RenderState::Failed
        } else if self.can_render {
            RenderState::Dispatched
        } else {
            RenderState::Pending
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Render lifecycle of a work item, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    /// Waiting for the throttle to release it.
    Pending,
    /// Released, render in flight.
    Dispatched,
    /// Payload received.
    Rendered,
    /// Regeneration limit reached. Terminal.
    Failed,
}

impl RenderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Rendered | RenderState::Failed)
    }
}

impl std::fmt::Display for RenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RenderState::Pending => "pending",
            RenderState::Dispatched => "dispatched",
            RenderState::Rendered => "rendered",
            RenderState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
