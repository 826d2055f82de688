//! Error types for impulse

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImpulseError {
    #[error("Asset not found: {0}")]
    AssetNotFound(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Impulse response contains no samples")]
    EmptyImpulse,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImpulseError>;
