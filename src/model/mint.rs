//! Shapes handed to the minting step.

use serde::{Deserialize, Serialize};

use super::item::{EntropyRange, Hash};

/// Reference to an assembled metadata document (typically a content URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRef(pub String);

impl std::fmt::Display for MetadataRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Drop-level context read by finalization and candidate projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropInfo {
    /// Drop name. Used as the display name fallback.
    pub name: String,
    pub price: String,
    pub description: Option<String>,
    /// Collection name, when the collection entity has one.
    pub collection_name: Option<String>,
    /// Content descriptor fed to the preview generator.
    pub content: String,
}

impl DropInfo {
    /// Collection name if present, otherwise the drop name.
    pub fn display_name(&self) -> &str {
        self.collection_name.as_deref().unwrap_or(&self.name)
    }
}

/// Normalized shape of a finished preview, ready for the next minting phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintCandidate {
    pub name: String,
    pub collection_name: String,
    pub image: String,
    pub price: String,
    pub hash: Hash,
    pub entropy_range: EntropyRange,
    pub can_render: bool,
}
