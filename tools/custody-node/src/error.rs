use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use custody_common::identity::IdentityError;
use custody_common::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("signature does not match caller")]
    BadSignature,

    #[error("nonce {nonce} is not above {last}, the last one accepted from this caller")]
    ReplayedNonce { nonce: u64, last: u64 },

    #[error("invalid identity in path: {0}")]
    BadIdentity(#[from] IdentityError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Ledger(e) => e.code(),
            ApiError::BadSignature => "bad_signature",
            ApiError::ReplayedNonce { .. } => "replayed_nonce",
            ApiError::BadIdentity(_) => "bad_identity",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(LedgerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::DuplicateIdentifier(_)) | ApiError::ReplayedNonce { .. } => {
                StatusCode::CONFLICT
            }
            ApiError::Ledger(LedgerError::Unauthorized) => StatusCode::FORBIDDEN,
            ApiError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadSignature => StatusCode::UNAUTHORIZED,
            ApiError::BadIdentity(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
