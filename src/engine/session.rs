//! Session signals owned outside the engine and read by it.

use crate::model::Hash;

/// Minting session context.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Acting identity, passed to regeneration.
    pub account_id: String,
    /// Drop content descriptor, passed to regeneration.
    pub content: String,
    /// Items recorded for the finished session. Non-empty means ended.
    pub minted: Vec<Hash>,
}

impl Session {
    pub fn new(account_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            content: content.into(),
            minted: Vec::new(),
        }
    }

    pub fn has_ended(&self) -> bool {
        !self.minted.is_empty()
    }
}
