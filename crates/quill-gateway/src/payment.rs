use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use quill_core::errors::UpstreamError;
use quill_core::ids::PaymentSessionId;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A freshly created checkout session the client should be redirected to.
#[derive(Clone, Debug)]
pub struct CheckoutSession {
    pub id: PaymentSessionId,
    pub url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Unpaid => "unpaid",
            Self::NoPaymentRequired => "no_payment_required",
        }
    }
}

/// What the payment collaborator reports about an existing session.
#[derive(Clone, Debug)]
pub struct SessionDetail {
    pub payment_status: PaymentStatus,
    /// Price id of the first line item, if the session has one.
    pub price_id: Option<String>,
}

/// External payment collaborator: creates checkout sessions and reports
/// payment status plus the purchased line-item price id.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        price_id: &str,
    ) -> Result<CheckoutSession, UpstreamError>;

    async fn retrieve_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<SessionDetail, UpstreamError>;
}

#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub base_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl StripeConfig {
    /// Read STRIPE_SECRET_KEY and SITE_URL from the environment.
    pub fn from_env() -> Option<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY").ok()?;
        if secret_key.is_empty() {
            return None;
        }
        let site_url = std::env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let site_url = site_url.trim_end_matches('/');
        Some(Self {
            secret_key: SecretString::from(secret_key),
            base_url: "https://api.stripe.com".into(),
            success_url: format!("{site_url}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{site_url}/pricing"),
        })
    }
}

/// Stripe checkout client. Requests are form-encoded per the Stripe API;
/// responses are the subset of fields this service reads.
pub struct StripeGateway {
    client: reqwest::Client,
    config: StripeConfig,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct RetrieveSessionResponse {
    payment_status: PaymentStatus,
    #[serde(default)]
    line_items: Option<LineItems>,
}

#[derive(Deserialize)]
struct LineItems {
    #[serde(default)]
    data: Vec<LineItem>,
}

#[derive(Deserialize)]
struct LineItem {
    #[serde(default)]
    price: Option<Price>,
}

#[derive(Deserialize)]
struct Price {
    id: String,
}

async fn into_upstream_error(resp: reqwest::Response) -> UpstreamError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    UpstreamError::from_status(status, body)
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self), fields(price_id))]
    async fn create_checkout_session(
        &self,
        price_id: &str,
    ) -> Result<CheckoutSession, UpstreamError> {
        let url = format!("{}/v1/checkout/sessions", self.config.base_url);
        let form = [
            ("mode", "payment"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1"),
            ("success_url", self.config.success_url.as_str()),
            ("cancel_url", self.config.cancel_url.as_str()),
        ];

        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(into_upstream_error(resp).await);
        }

        let payload: CreateSessionResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidRequest(format!("bad session payload: {e}")))?;

        Ok(CheckoutSession {
            id: PaymentSessionId::from_raw(payload.id),
            url: payload.url,
        })
    }

    #[instrument(skip(self), fields(payment_session = %session_id))]
    async fn retrieve_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<SessionDetail, UpstreamError> {
        let url = format!(
            "{}/v1/checkout/sessions/{}",
            self.config.base_url,
            session_id.as_str()
        );

        let resp = self
            .client
            .get(&url)
            .query(&[("expand[]", "line_items")])
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| UpstreamError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(into_upstream_error(resp).await);
        }

        let payload: RetrieveSessionResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidRequest(format!("bad session payload: {e}")))?;

        let price_id = payload
            .line_items
            .and_then(|items| items.data.into_iter().next())
            .and_then(|item| item.price)
            .map(|price| price.id);

        Ok(SessionDetail {
            payment_status: payload.payment_status,
            price_id,
        })
    }
}
