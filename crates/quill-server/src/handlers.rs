//! HTTP handlers. Thin: parse the request, call the flow, shape the reply.

use axum::extract::{Multipart, Query, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use quill_core::ids::PaymentSessionId;
use quill_core::pricing;
use quill_gateway::speech::{ResponseFormat, TranscribeOptions};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::redemption;
use crate::server::AppState;
use crate::transcription;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_session_id: String,
    pub url: Option<String>,
}

pub async fn checkout(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    // The catalog is the source of truth; don't create upstream sessions
    // for price ids we could never redeem.
    if pricing::credits_for_price(&req.price_id).is_none() {
        return Err(ApiError::UnknownPrice(req.price_id));
    }

    let session = state
        .payments
        .create_checkout_session(&req.price_id)
        .await
        .map_err(ApiError::Upstream)?;

    Ok(Json(CheckoutResponse {
        checkout_session_id: session.id.as_str().to_string(),
        url: session.url,
    }))
}

#[derive(Deserialize)]
pub struct RedeemQuery {
    pub session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub credits_granted: i64,
}

pub async fn redeem(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(query): Query<RedeemQuery>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let session_id = query
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingSessionId)?;

    let outcome = redemption::redeem_session(
        &state.redemptions,
        state.payments.as_ref(),
        &session.user_id,
        &PaymentSessionId::from_raw(session_id),
    )
    .await?;

    Ok(Json(RedeemResponse {
        credits_granted: outcome.credits_granted,
    }))
}

#[derive(Serialize)]
pub struct TranscribeResponse {
    pub text: String,
}

pub async fn transcribe(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<TranscribeResponse>, ApiError> {
    let mut audio: Option<(Bytes, String)> = None;
    let mut options = TranscribeOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidMultipart(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidMultipart(e.to_string()))?;
                audio = Some((bytes, filename));
            }
            Some("language") => {
                options.language = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidMultipart(e.to_string()))?;
            }
            Some("prompt") => {
                options.prompt = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidMultipart(e.to_string()))?;
            }
            Some("model") => {
                options.model = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidMultipart(e.to_string()))?;
            }
            Some("format") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidMultipart(e.to_string()))?;
                options.response_format = ResponseFormat::parse_or_text(&raw);
            }
            _ => {}
        }
    }

    let (bytes, filename) = audio.ok_or(ApiError::MissingFile)?;

    let text = transcription::transcribe_upload(
        &state.ledger,
        state.speech.as_ref(),
        state.credit_policy,
        &session.user_id,
        bytes,
        &filename,
        &options,
    )
    .await?;

    Ok(Json(TranscribeResponse { text }))
}

#[derive(Serialize)]
pub struct CreditsResponse {
    pub balance: i64,
}

pub async fn credits(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<CreditsResponse>, ApiError> {
    let balance = state.ledger.balance(&session.user_id)?;
    Ok(Json(CreditsResponse { balance }))
}
