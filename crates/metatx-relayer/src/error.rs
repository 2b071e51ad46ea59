use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use alloy::primitives::Address;
use metatx::{ErrorBody, MetaTxError};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed")]
    AuthFailed,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("target {0} is not whitelisted")]
    NotWhitelisted(Address),

    /// The forwarder would reject the request (signature or nonce).
    #[error("rejected: {0}")]
    Rejected(MetaTxError),

    /// The forwarder transaction itself reverted.
    #[error("execution failed: {0}")]
    Execution(MetaTxError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    fn code(&self) -> &'static str {
        match self {
            RelayError::AuthRequired => "authentication_required",
            RelayError::AuthFailed => "authentication_failed",
            RelayError::InvalidBody(_) => "invalid_body",
            RelayError::InvalidAddress(_) => "invalid_address",
            RelayError::NotWhitelisted(_) => "not_whitelisted",
            RelayError::Rejected(MetaTxError::NonceMismatch { .. }) => "nonce_mismatch",
            RelayError::Rejected(_) => "invalid_signature",
            RelayError::Execution(_) => "execution_failed",
            RelayError::Internal(_) => "internal_error",
        }
    }
}

impl From<MetaTxError> for RelayError {
    fn from(e: MetaTxError) -> Self {
        if e.is_invalid_signature_or_nonce() {
            RelayError::Rejected(e)
        } else {
            RelayError::Execution(e)
        }
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::AuthRequired | RelayError::AuthFailed => StatusCode::UNAUTHORIZED,
            RelayError::InvalidBody(_)
            | RelayError::InvalidAddress(_)
            | RelayError::Rejected(_) => StatusCode::BAD_REQUEST,
            RelayError::NotWhitelisted(_) => StatusCode::FORBIDDEN,
            RelayError::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            RelayError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code().to_string(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    #[test]
    fn test_forwarder_rejections_are_bad_requests() {
        let err: RelayError = MetaTxError::NonceMismatch {
            expected: U256::from(1u64),
            got: U256::ZERO,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "nonce_mismatch");

        let err: RelayError = MetaTxError::InvalidSignature("short".into()).into();
        assert_eq!(err.code(), "invalid_signature");
    }

    #[test]
    fn test_reverts_are_unprocessable() {
        let err: RelayError = MetaTxError::Revert("reentrant call".into()).into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_whitelist_is_forbidden() {
        let err = RelayError::NotWhitelisted(Address::ZERO);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
