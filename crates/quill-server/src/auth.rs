use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::instrument;

use quill_gateway::identity::AuthSession;

use crate::error::ApiError;
use crate::server::AppState;

/// Per-request identity, resolved from the bearer token by the identity
/// collaborator. There is no ambient current-user state anywhere: every
/// handler that needs a user takes this extractor.
///
/// Resolving a session is also where a new user is first seen, so the
/// one-time bootstrap grant happens here.
pub struct CurrentUser(pub AuthSession);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    #[instrument(skip_all)]
    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        let session = state
            .identity
            .resolve_session(token)
            .await
            .map_err(ApiError::Upstream)?
            .ok_or(ApiError::Unauthorized)?;

        state.ledger.ensure_bootstrapped(&session.user_id)?;

        Ok(CurrentUser(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/credits");
        if let Some(v) = value {
            builder = builder.header(AUTHORIZATION, v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn bearer_token_extraction() {
        let parts = parts_with_auth(Some("Bearer jwt-abc"));
        assert_eq!(bearer_token(&parts), Some("jwt-abc"));
    }

    #[test]
    fn missing_header_yields_none() {
        let parts = parts_with_auth(None);
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn non_bearer_scheme_yields_none() {
        let parts = parts_with_auth(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(bearer_token(&parts), None);
    }
}
