use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use quill_core::ids::{EntryId, PaymentSessionId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::ledger::{EntryKind, LedgerEntry};
use crate::row_helpers;

/// A payment session that has already been converted into ledger credit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedemptionRow {
    pub session_id: PaymentSessionId,
    pub user_id: UserId,
    pub credits: i64,
    pub consumed_at: String,
}

pub struct RedemptionRepo {
    db: Database,
}

impl RedemptionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fast-path check used before the payment collaborator is consulted.
    /// The authoritative guarantee is the primary key on session_id, not
    /// this read.
    #[instrument(skip(self), fields(payment_session = %session_id))]
    pub fn is_redeemed(&self, session_id: &PaymentSessionId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM used_payment_sessions WHERE session_id = ?1",
                [session_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    #[instrument(skip(self), fields(payment_session = %session_id))]
    pub fn get(&self, session_id: &PaymentSessionId) -> Result<RedemptionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, user_id, credits, consumed_at
                 FROM used_payment_sessions WHERE session_id = ?1",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_redemption(row),
                None => Err(StoreError::NotFound(format!("redemption {session_id}"))),
            }
        })
    }

    /// Record the session as consumed and grant the purchased credits in a
    /// single transaction. A replay hits the session_id primary key and
    /// rolls back without touching the ledger, so the grant happens at most
    /// once per session no matter how many callers race.
    #[instrument(skip(self), fields(payment_session = %session_id, user_id = %user_id, credits))]
    pub fn redeem(
        &self,
        session_id: &PaymentSessionId,
        user_id: &UserId,
        credits: i64,
    ) -> Result<LedgerEntry, StoreError> {
        let entry_id = EntryId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            tx.execute(
                "INSERT INTO used_payment_sessions (session_id, user_id, credits, consumed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![session_id.as_str(), user_id.as_str(), credits, now],
            )?;

            tx.execute(
                "INSERT INTO credits_ledger (id, user_id, delta, kind, created_at)
                 VALUES (?1, ?2, ?3, 'purchase', ?4)",
                rusqlite::params![entry_id.as_str(), user_id.as_str(), credits, now],
            )?;

            tx.commit()?;

            Ok(LedgerEntry {
                id: entry_id.clone(),
                user_id: user_id.clone(),
                delta: credits,
                kind: EntryKind::Purchase,
                created_at: now.clone(),
            })
        })
    }
}

fn row_to_redemption(row: &rusqlite::Row<'_>) -> Result<RedemptionRow, StoreError> {
    Ok(RedemptionRow {
        session_id: PaymentSessionId::from_raw(row_helpers::get::<String>(
            row,
            0,
            "used_payment_sessions",
            "session_id",
        )?),
        user_id: UserId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "used_payment_sessions",
            "user_id",
        )?),
        credits: row_helpers::get(row, 2, "used_payment_sessions", "credits")?,
        consumed_at: row_helpers::get(row, 3, "used_payment_sessions", "consumed_at")?,
    })
}
