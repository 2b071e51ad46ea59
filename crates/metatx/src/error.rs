use alloy::primitives::{Address, U256};
use thiserror::Error;

/// Errors returned by meta-transaction operations.
#[derive(Debug, Error)]
pub enum MetaTxError {
    #[error("signature mismatch: recovered {recovered}, request is from {claimed}")]
    SignatureMismatch { recovered: Address, claimed: Address },

    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: U256, got: U256 },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("forwarded call failed: {reason}")]
    ForwardedCallFailed { reason: String },

    #[error("insufficient gas for forwarded call: requires {required}, {available} available")]
    InsufficientGas { required: u64, available: u64 },

    #[error("execution reverted: {0}")]
    Revert(String),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("nonce store error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl MetaTxError {
    /// True for the failures that make a forwarder reject a request outright.
    /// The client must re-fetch its nonce and re-sign before retrying.
    pub fn is_invalid_signature_or_nonce(&self) -> bool {
        matches!(
            self,
            MetaTxError::SignatureMismatch { .. }
                | MetaTxError::NonceMismatch { .. }
                | MetaTxError::InvalidSignature(_)
        )
    }
}
