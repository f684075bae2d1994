//! Deterministic collaborator implementations for tests. No network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use quill_core::errors::UpstreamError;
use quill_core::ids::{PaymentSessionId, UserId};

use crate::identity::{AuthSession, IdentityProvider, OAuthProvider};
use crate::payment::{CheckoutSession, PaymentGateway, PaymentStatus, SessionDetail};
use crate::speech::{SpeechToText, TranscribeOptions};

/// Identity collaborator with a fixed token → session table.
#[derive(Default)]
pub struct MockIdentity {
    sessions: Mutex<HashMap<String, AuthSession>>,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token that resolves to the given user.
    pub fn allow(&self, token: &str, user_id: &UserId, email: &str) {
        self.sessions.lock().insert(
            token.to_string(),
            AuthSession {
                user_id: user_id.clone(),
                email: email.to_string(),
            },
        );
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn resolve_session(
        &self,
        access_token: &str,
    ) -> Result<Option<AuthSession>, UpstreamError> {
        Ok(self.sessions.lock().get(access_token).cloned())
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        format!("mock://authorize?provider={provider}&redirect_to={redirect_to}")
    }
}

/// Payment collaborator backed by an in-memory session table.
#[derive(Default)]
pub struct MockPaymentGateway {
    sessions: Mutex<HashMap<String, SessionDetail>>,
    created: Mutex<Vec<String>>,
    fail_create: Mutex<bool>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session the gateway will report on retrieval.
    pub fn insert_session(&self, session_id: &PaymentSessionId, detail: SessionDetail) {
        self.sessions
            .lock()
            .insert(session_id.as_str().to_string(), detail);
    }

    /// Register a paid session for the given price id.
    pub fn insert_paid_session(&self, session_id: &PaymentSessionId, price_id: &str) {
        self.insert_session(
            session_id,
            SessionDetail {
                payment_status: PaymentStatus::Paid,
                price_id: Some(price_id.to_string()),
            },
        );
    }

    /// Make create_checkout_session fail with a server error.
    pub fn fail_creates(&self) {
        *self.fail_create.lock() = true;
    }

    /// Price ids passed to create_checkout_session, in order.
    pub fn created_price_ids(&self) -> Vec<String> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout_session(
        &self,
        price_id: &str,
    ) -> Result<CheckoutSession, UpstreamError> {
        if *self.fail_create.lock() {
            return Err(UpstreamError::ServerError {
                status: 500,
                body: "mock payment outage".into(),
            });
        }
        self.created.lock().push(price_id.to_string());
        let id = PaymentSessionId::new();
        Ok(CheckoutSession {
            url: Some(format!("mock://checkout/{id}")),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &PaymentSessionId,
    ) -> Result<SessionDetail, UpstreamError> {
        self.sessions
            .lock()
            .get(session_id.as_str())
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound(format!("no such session: {session_id}")))
    }
}

/// Speech collaborator returning a fixed transcript or a fixed failure.
pub struct MockSpeech {
    result: Result<String, UpstreamError>,
    calls: AtomicUsize,
}

impl MockSpeech {
    pub fn returning(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: UpstreamError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many transcription requests reached the collaborator.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SpeechToText for MockSpeech {
    async fn transcribe(
        &self,
        _audio: Bytes,
        _filename: &str,
        _options: &TranscribeOptions,
    ) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.result.clone()
    }
}
