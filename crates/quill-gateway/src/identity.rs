use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use quill_core::errors::UpstreamError;
use quill_core::ids::UserId;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The closed set of social-login providers the identity collaborator
/// supports. Dispatch happens through `authorize_url`, never through
/// per-provider types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Facebook,
    Twitter,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            "twitter" => Ok(Self::Twitter),
            other => Err(format!("unknown oauth provider: {other}")),
        }
    }
}

/// The identity the collaborator vouches for on a given access token.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: String,
}

/// External identity collaborator. Sessions are issued and owned upstream;
/// this service only resolves tokens into user identities, once per request.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token into the session it represents.
    /// `Ok(None)` means the token is invalid or expired, not an error.
    async fn resolve_session(&self, access_token: &str)
        -> Result<Option<AuthSession>, UpstreamError>;

    /// Where to send a browser to begin an OAuth login with the given
    /// provider.
    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String;
}

#[derive(Clone)]
pub struct IdentityConfig {
    pub base_url: String,
    pub anon_key: SecretString,
}

impl IdentityConfig {
    /// Read IDENTITY_URL / IDENTITY_ANON_KEY from the environment.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("IDENTITY_URL").ok()?;
        let anon_key = std::env::var("IDENTITY_ANON_KEY").ok()?;
        if base_url.is_empty() || anon_key.is_empty() {
            return None;
        }
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: SecretString::from(anon_key),
        })
    }
}

/// GoTrue-style identity collaborator client.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    config: IdentityConfig,
}

#[derive(Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(config: IdentityConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self, access_token))]
    async fn resolve_session(
        &self,
        access_token: &str,
    ) -> Result<Option<AuthSession>, UpstreamError> {
        let url = format!("{}/auth/v1/user", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .header("apikey", self.config.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::from_status(status.as_u16(), body));
        }

        let payload: UserPayload = resp
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidRequest(format!("bad user payload: {e}")))?;

        Ok(Some(AuthSession {
            user_id: UserId::from_raw(payload.id),
            email: payload.email.unwrap_or_default(),
        }))
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}",
            self.config.base_url,
            provider.as_str(),
            redirect_to
        )
    }
}
