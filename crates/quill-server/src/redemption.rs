//! Converts a completed payment session into ledger credit, at most once.

use tracing::{info, instrument, warn};

use quill_core::ids::{PaymentSessionId, UserId};
use quill_core::pricing;
use quill_gateway::payment::PaymentGateway;
use quill_store::ledger::LedgerEntry;
use quill_store::redemptions::RedemptionRepo;

use crate::error::ApiError;

#[derive(Debug)]
pub struct RedemptionOutcome {
    pub credits_granted: i64,
}

/// Redeem a payment session for the current user.
///
/// The pre-check against the used-sessions table is a fast path only; the
/// store's primary key on session_id is what makes the grant exactly-once
/// when calls race. Recording the session and granting the credit commit
/// together, so a failure leaves neither behind.
#[instrument(skip(redemptions, payments), fields(user_id = %user_id, payment_session = %session_id))]
pub async fn redeem_session(
    redemptions: &RedemptionRepo,
    payments: &dyn PaymentGateway,
    user_id: &UserId,
    session_id: &PaymentSessionId,
) -> Result<RedemptionOutcome, ApiError> {
    if redemptions.is_redeemed(session_id)? {
        return Err(ApiError::AlreadyRedeemed);
    }

    let detail = payments
        .retrieve_session(session_id)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                ApiError::SessionNotFound
            } else {
                ApiError::Upstream(e)
            }
        })?;

    if !detail.payment_status.is_paid() {
        return Err(ApiError::PaymentIncomplete);
    }

    let price_id = detail
        .price_id
        .ok_or_else(|| ApiError::UnknownPrice("no line item price".into()))?;
    let credits =
        pricing::credits_for_price(&price_id).ok_or_else(|| ApiError::UnknownPrice(price_id.clone()))?;

    let entry: LedgerEntry = redemptions
        .redeem(session_id, user_id, credits)
        .map_err(|e| {
            if e.is_conflict() {
                warn!("lost redemption race, session already consumed");
                ApiError::AlreadyRedeemed
            } else {
                ApiError::Store(e)
            }
        })?;

    info!(credits = entry.delta, "payment session redeemed");

    Ok(RedemptionOutcome {
        credits_granted: entry.delta,
    })
}
