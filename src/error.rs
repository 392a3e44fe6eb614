//! Error types for massmint-preview.

use thiserror::Error;

use crate::model::Hash;

#[derive(Debug, Error)]
pub enum Error {
    #[error("work item not found: {0}")]
    NotFound(Hash),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("metadata assembly failed: {0}")]
    Metadata(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
