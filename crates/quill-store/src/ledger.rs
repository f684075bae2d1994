use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use quill_core::ids::{EntryId, UserId};
use quill_core::pricing::BOOTSTRAP_GRANT;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Why a ledger row exists. Rows are immutable once written; the ledger is
/// append-only and a user's balance is the sum of their deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Bootstrap,
    Purchase,
    Usage,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::Purchase => write!(f, "purchase"),
            Self::Usage => write!(f, "usage"),
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootstrap" => Ok(Self::Bootstrap),
            "purchase" => Ok(Self::Purchase),
            "usage" => Ok(Self::Usage),
            other => Err(format!("unknown entry kind: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub delta: i64,
    pub kind: EntryKind,
    pub created_at: String,
}

pub struct LedgerRepo {
    db: Database,
}

impl LedgerRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a signed delta for a user. No sign or balance validation here:
    /// callers choose positive (grant) or negative (debit) deltas.
    #[instrument(skip(self), fields(user_id = %user_id, delta, kind = %kind))]
    pub fn append(
        &self,
        user_id: &UserId,
        delta: i64,
        kind: EntryKind,
    ) -> Result<LedgerEntry, StoreError> {
        let id = EntryId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credits_ledger (id, user_id, delta, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), user_id.as_str(), delta, kind.to_string(), now],
            )?;

            Ok(LedgerEntry {
                id,
                user_id: user_id.clone(),
                delta,
                kind,
                created_at: now,
            })
        })
    }

    /// Current balance: sum of all deltas for the user. A storage failure
    /// surfaces as an error; callers must treat the balance as unknown
    /// rather than zero.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn balance(&self, user_id: &UserId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let sum: i64 = conn.query_row(
                "SELECT COALESCE(SUM(delta), 0) FROM credits_ledger WHERE user_id = ?1",
                [user_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(sum)
        })
    }

    /// Grant the one-time bootstrap allotment if this user has never
    /// received one. A partial unique index on (user_id) for bootstrap rows
    /// makes the INSERT OR IGNORE idempotent under arbitrary concurrency.
    /// Returns whether a grant was written by this call.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn ensure_bootstrapped(&self, user_id: &UserId) -> Result<bool, StoreError> {
        let id = EntryId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO credits_ledger (id, user_id, delta, kind, created_at)
                 VALUES (?1, ?2, ?3, 'bootstrap', ?4)",
                rusqlite::params![id.as_str(), user_id.as_str(), BOOTSTRAP_GRANT, now],
            )?;
            Ok(changed > 0)
        })
    }

    /// All ledger rows for a user, oldest first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn entries(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, delta, kind, created_at
                 FROM credits_ledger WHERE user_id = ?1 ORDER BY created_at, id",
            )?;
            let mut rows = stmt.query([user_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_entry(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<LedgerEntry, StoreError> {
    let kind_str: String = row_helpers::get(row, 3, "credits_ledger", "kind")?;

    Ok(LedgerEntry {
        id: EntryId::from_raw(row_helpers::get::<String>(row, 0, "credits_ledger", "id")?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "credits_ledger", "user_id")?),
        delta: row_helpers::get(row, 2, "credits_ledger", "delta")?,
        kind: row_helpers::parse_enum(&kind_str, "credits_ledger", "kind")?,
        created_at: row_helpers::get(row, 4, "credits_ledger", "created_at")?,
    })
}
