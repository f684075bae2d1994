use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use quill_core::errors::UpstreamError;
use quill_store::StoreError;

/// Request-level errors for the HTTP surface. Every variant maps to a
/// status code and a human-readable message; internal detail stays in the
/// logs.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or invalid access token")]
    Unauthorized,

    #[error("missing session_id")]
    MissingSessionId,

    #[error("no file uploaded")]
    MissingFile,

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: usize, limit: usize },

    #[error("invalid multipart body")]
    InvalidMultipart(String),

    #[error("no credits for this price: {0}")]
    UnknownPrice(String),

    #[error("this session has already been used")]
    AlreadyRedeemed,

    #[error("payment session not found")]
    SessionNotFound,

    #[error("payment not completed")]
    PaymentIncomplete,

    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("transcription failed")]
    TranscriptionFailed,

    #[error("storage failure")]
    Store(#[from] StoreError),

    #[error("upstream failure")]
    Upstream(UpstreamError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MissingSessionId
            | Self::MissingFile
            | Self::UnsupportedFormat(_)
            | Self::FileTooLarge { .. }
            | Self::InvalidMultipart(_)
            | Self::UnknownPrice(_) => StatusCode::BAD_REQUEST,
            Self::PaymentIncomplete | Self::InsufficientCredits { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            Self::SessionNotFound => StatusCode::NOT_FOUND,
            Self::AlreadyRedeemed => StatusCode::CONFLICT,
            Self::TranscriptionFailed | Self::Store(_) | Self::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Store(e) => error!(detail = %e, "storage failure"),
            Self::Upstream(e) => error!(kind = e.error_kind(), detail = %e, "upstream failure"),
            Self::InvalidMultipart(detail) => warn!(detail, "invalid multipart body"),
            _ if status.is_server_error() => error!(error = %self, "request failed"),
            _ => {}
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_400() {
        assert_eq!(ApiError::MissingSessionId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::UnsupportedFormat(".txt".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UnknownPrice("price_x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conflict_and_payment_statuses() {
        assert_eq!(ApiError::AlreadyRedeemed.status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::PaymentIncomplete.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ApiError::InsufficientCredits {
                balance: 4,
                required: 10
            }
            .status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(ApiError::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn failures_are_500() {
        assert_eq!(
            ApiError::TranscriptionFailed.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Store(StoreError::Database("locked".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Upstream(UpstreamError::RateLimited).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_redact_internal_detail() {
        let err = ApiError::Store(StoreError::Database("disk I/O error at page 42".into()));
        assert_eq!(err.to_string(), "storage failure");

        let err = ApiError::Upstream(UpstreamError::ServerError {
            status: 500,
            body: "stripe stack trace".into(),
        });
        assert_eq!(err.to_string(), "upstream failure");
    }
}
