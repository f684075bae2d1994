/// Typed errors for calls to external collaborators (identity, payment,
/// speech-to-text). No retry machinery exists anywhere in this service:
/// a collaborator failure surfaces to the caller immediately, so the
/// classification here exists for status mapping and logging only.
#[derive(Clone, Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited")]
    RateLimited,
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
}

impl UpstreamError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimited,
            400..=499 => Self::InvalidRequest(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            UpstreamError::from_status(401, "unauthorized".into()),
            UpstreamError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            UpstreamError::from_status(403, "forbidden".into()),
            UpstreamError::AuthenticationFailed(_)
        ));
        assert!(UpstreamError::from_status(404, "no such session".into()).is_not_found());
        assert!(matches!(
            UpstreamError::from_status(429, "slow down".into()),
            UpstreamError::RateLimited
        ));
        assert!(matches!(
            UpstreamError::from_status(400, "bad request".into()),
            UpstreamError::InvalidRequest(_)
        ));
        assert!(matches!(
            UpstreamError::from_status(502, "bad gateway".into()),
            UpstreamError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(UpstreamError::RateLimited.error_kind(), "rate_limited");
        assert_eq!(
            UpstreamError::NetworkError("tcp reset".into()).error_kind(),
            "network_error"
        );
        assert_eq!(
            UpstreamError::NotFound("cs_123".into()).error_kind(),
            "not_found"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = UpstreamError::ServerError {
            status: 500,
            body: "internal".into(),
        };
        assert_eq!(err.to_string(), "server error 500: internal");
    }
}
