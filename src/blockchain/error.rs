use thiserror::Error;

/// A block could not be constructed from the supplied fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl BlockError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        BlockError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid genesis block: {0}")]
    InvalidGenesis(String),

    #[error("nonce space exhausted while mining block #{index}")]
    NonceSpaceExhausted { index: u64 },
}

pub type Result<T> = std::result::Result<T, ChainError>;
