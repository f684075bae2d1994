use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use quill_gateway::identity::IdentityProvider;
use quill_gateway::payment::PaymentGateway;
use quill_gateway::speech::SpeechToText;
use quill_store::ledger::LedgerRepo;
use quill_store::redemptions::RedemptionRepo;
use quill_store::Database;

use crate::handlers;
use crate::transcription::{CreditPolicy, MAX_UPLOAD_BYTES};

/// Headroom on top of the audio ceiling for multipart framing and the
/// option fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            request_timeout_secs: 300,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerRepo>,
    pub redemptions: Arc<RedemptionRepo>,
    pub identity: Arc<dyn IdentityProvider>,
    pub payments: Arc<dyn PaymentGateway>,
    pub speech: Arc<dyn SpeechToText>,
    pub credit_policy: CreditPolicy,
}

impl AppState {
    pub fn new(
        db: Database,
        identity: Arc<dyn IdentityProvider>,
        payments: Arc<dyn PaymentGateway>,
        speech: Arc<dyn SpeechToText>,
        credit_policy: CreditPolicy,
    ) -> Self {
        Self {
            ledger: Arc::new(LedgerRepo::new(db.clone())),
            redemptions: Arc::new(RedemptionRepo::new(db)),
            identity,
            payments,
            speech,
            credit_policy,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/checkout", post(handlers::checkout))
        .route("/redeem", get(handlers::redeem))
        .route("/transcribe", post(handlers::transcribe))
        .route("/credits", get(handlers::credits))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle holding the bound port.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, &config);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "quill server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()`. Keeps the accept loop alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::ids::{PaymentSessionId, UserId};
    use quill_gateway::mock::{MockIdentity, MockPaymentGateway, MockSpeech};

    struct TestHarness {
        port: u16,
        payments: Arc<MockPaymentGateway>,
        speech: Arc<MockSpeech>,
        _handle: ServerHandle,
    }

    impl TestHarness {
        fn url(&self, path: &str) -> String {
            format!("http://127.0.0.1:{}{}", self.port, path)
        }
    }

    async fn start_harness(policy: CreditPolicy, speech: MockSpeech) -> TestHarness {
        let db = Database::in_memory().unwrap();
        let identity = Arc::new(MockIdentity::new());
        let payments = Arc::new(MockPaymentGateway::new());
        let speech = Arc::new(speech);
        let user = UserId::new();
        identity.allow("tok-user", &user, "sam@example.com");

        let state = AppState::new(
            db,
            identity,
            payments.clone(),
            speech.clone(),
            policy,
        );
        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };
        let handle = start(config, state).await.unwrap();

        TestHarness {
            port: handle.port,
            payments,
            speech,
            _handle: handle,
        }
    }

    fn audio_form(filename: &str) -> reqwest::multipart::Form {
        reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(b"fake-audio-bytes".to_vec())
                .file_name(filename.to_string()),
        )
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        assert!(h.port > 0);

        let resp = reqwest::get(h.url("/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn credit_routes_require_a_token() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let resp = client.get(h.url("/credits")).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = client
            .get(h.url("/credits"))
            .bearer_auth("not-a-session")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn first_sight_bootstraps_the_balance() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(h.url("/credits"))
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["balance"], 100);
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_price() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(h.url("/checkout"))
            .bearer_auth("tok-user")
            .json(&serde_json::json!({ "priceId": "price_retired_plan" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(h.payments.created_price_ids().is_empty());
    }

    #[tokio::test]
    async fn checkout_creates_upstream_session() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(h.url("/checkout"))
            .bearer_auth("tok-user")
            .json(&serde_json::json!({ "priceId": "price_pro_120" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["checkoutSessionId"]
            .as_str()
            .unwrap()
            .starts_with("cs_"));
        assert_eq!(h.payments.created_price_ids(), vec!["price_pro_120"]);
    }

    #[tokio::test]
    async fn checkout_surfaces_collaborator_outage_as_500() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        h.payments.fail_creates();
        let client = reqwest::Client::new();

        let resp = client
            .post(h.url("/checkout"))
            .bearer_auth("tok-user")
            .json(&serde_json::json!({ "priceId": "price_basic_50" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
    }

    #[tokio::test]
    async fn redeem_requires_session_id() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(h.url("/redeem"))
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn transcribe_rejects_unsupported_format() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(h.url("/transcribe"))
            .bearer_auth("tok-user")
            .multipart(audio_form("notes.txt"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(h.speech.call_count(), 0);

        // Balance untouched beyond the bootstrap grant
        let resp = client
            .get(h.url("/credits"))
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["balance"], 100);
    }

    #[tokio::test]
    async fn transcribe_without_file_is_400() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let form = reqwest::multipart::Form::new().text("language", "en");
        let resp = client
            .post(h.url("/transcribe"))
            .bearer_auth("tok-user")
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn transcribe_failure_is_500_and_free() {
        let h = start_harness(
            CreditPolicy::Enforce,
            MockSpeech::failing(quill_core::errors::UpstreamError::ServerError {
                status: 500,
                body: "overloaded".into(),
            }),
        )
        .await;
        let client = reqwest::Client::new();

        let resp = client
            .post(h.url("/transcribe"))
            .bearer_auth("tok-user")
            .multipart(audio_form("note.mp3"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);

        let resp = client
            .get(h.url("/credits"))
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["balance"], 100);
    }

    #[tokio::test]
    async fn bootstrap_redeem_transcribe_replay_scenario() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("the transcript")).await;
        let client = reqwest::Client::new();

        // Bootstrap on first sight
        let resp = client
            .get(h.url("/credits"))
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["balance"], 100);

        // Redeem a paid session worth 50 credits
        let session = PaymentSessionId::from_raw("cs_test_scenario");
        h.payments.insert_paid_session(&session, "price_basic_50");

        let resp = client
            .get(h.url("/redeem"))
            .query(&[("session_id", "cs_test_scenario")])
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["creditsGranted"], 50);

        // Transcribe once
        let resp = client
            .post(h.url("/transcribe"))
            .bearer_auth("tok-user")
            .multipart(audio_form("standup.mp3"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["text"], "the transcript");
        assert_eq!(h.speech.call_count(), 1);

        // Replay the redemption
        let resp = client
            .get(h.url("/redeem"))
            .query(&[("session_id", "cs_test_scenario")])
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);

        // 100 + 50 - 10, unchanged by the replay
        let resp = client
            .get(h.url("/credits"))
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["balance"], 140);
    }

    #[tokio::test]
    async fn redeem_unpaid_session_is_402() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        let session = PaymentSessionId::from_raw("cs_test_unpaid");
        h.payments.insert_session(
            &session,
            quill_gateway::payment::SessionDetail {
                payment_status: quill_gateway::payment::PaymentStatus::Unpaid,
                price_id: Some("price_basic_50".into()),
            },
        );

        let resp = client
            .get(h.url("/redeem"))
            .query(&[("session_id", "cs_test_unpaid")])
            .bearer_auth("tok-user")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 402);
    }

    #[tokio::test]
    async fn enforce_policy_rejects_broke_user_with_402() {
        let h = start_harness(CreditPolicy::Enforce, MockSpeech::returning("hi")).await;
        let client = reqwest::Client::new();

        // Burn the bootstrap grant down to 0 with ten transcriptions
        for _ in 0..10 {
            let resp = client
                .post(h.url("/transcribe"))
                .bearer_auth("tok-user")
                .multipart(audio_form("clip.wav"))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
        }

        let resp = client
            .post(h.url("/transcribe"))
            .bearer_auth("tok-user")
            .multipart(audio_form("clip.wav"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 402);
        assert_eq!(h.speech.call_count(), 10);
    }
}
