use event_bus::{BusError, HandlerError};
use thiserror::Error;

/// Errors raised while encoding or decoding contract events.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The envelope does not decode into the closed event set.
    #[error("event does not match contract: {0}")]
    Decode(String),

    /// An event failed to serialize for publishing.
    #[error("event failed to encode: {0}")]
    Encode(#[from] serde_json::Error),

    /// The bus rejected the publish.
    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<ContractError> for HandlerError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Decode(msg) => HandlerError::Malformed(msg),
            other => HandlerError::Retryable(other.to_string()),
        }
    }
}
