/// SQL DDL for the quill-store database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS credits_ledger (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    delta INTEGER NOT NULL,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS used_payment_sessions (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    credits INTEGER NOT NULL,
    consumed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_user ON credits_ledger(user_id);
CREATE INDEX IF NOT EXISTS idx_ledger_user_kind ON credits_ledger(user_id, kind);

-- At most one bootstrap grant per user; INSERT OR IGNORE against this
-- index is what makes ensure_bootstrapped idempotent under concurrency.
CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_bootstrap
    ON credits_ledger(user_id) WHERE kind = 'bootstrap';

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
