use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use quill_gateway::identity::{HttpIdentityProvider, IdentityConfig};
use quill_gateway::payment::{StripeConfig, StripeGateway};
use quill_gateway::speech::{OpenAiConfig, OpenAiSpeech};
use quill_server::{AppState, CreditPolicy, ServerConfig};
use quill_store::Database;
use quill_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::default());

    tracing::info!("starting quill server");

    let db_path = match std::env::var("QUILL_DB") {
        Ok(path) => PathBuf::from(path),
        Err(_) => dirs_home().join(".quill").join("quill.db"),
    };
    let db = Database::open(&db_path).context("failed to open database")?;

    let identity = IdentityConfig::from_env()
        .context("IDENTITY_URL and IDENTITY_ANON_KEY must be set")
        .map(HttpIdentityProvider::new)?;
    let payments = StripeConfig::from_env()
        .context("STRIPE_SECRET_KEY must be set")
        .map(StripeGateway::new)?;
    let speech = OpenAiConfig::from_env()
        .context("OPENAI_API_KEY must be set")
        .map(OpenAiSpeech::new)?;

    let credit_policy = CreditPolicy::from_env();
    tracing::info!(?credit_policy, "credit policy resolved");

    let state = AppState::new(
        db,
        Arc::new(identity),
        Arc::new(payments),
        Arc::new(speech),
        credit_policy,
    );

    let port = std::env::var("QUILL_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8787);
    let config = ServerConfig {
        port,
        ..Default::default()
    };

    let handle = quill_server::start(config, state)
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port, "quill server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
