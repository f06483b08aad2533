//! DDL for the bill database.

use rusqlite::{params, Connection};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Idempotent: every statement uses `IF NOT EXISTS`.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- AUTOINCREMENT keeps ids of deleted bills from being handed out again,
-- since they double as reminder keys.
CREATE TABLE IF NOT EXISTS bills (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL,
    amount              REAL NOT NULL CHECK (amount > 0),
    due_date            TEXT NOT NULL,      -- YYYY-MM-DD
    is_paid             INTEGER NOT NULL DEFAULT 0,
    recurrence_type     INTEGER NOT NULL DEFAULT 0,
    recurrence_interval INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_bills_unpaid_due ON bills(is_paid, due_date);

-- Pending wake-ups of the host alarm facility, at most one per bill.
CREATE TABLE IF NOT EXISTS wakeups (
    bill_id INTEGER PRIMARY KEY,
    fire_at TEXT NOT NULL,              -- YYYY-MM-DD HH:MM:SS, local
    timing  TEXT NOT NULL,              -- exact | inexact
    payload TEXT NOT NULL               -- JSON reminder payload
);

CREATE INDEX IF NOT EXISTS idx_wakeups_fire_at ON wakeups(fire_at);
"#;

pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// `None` when the version row is missing or unreadable.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let value: String = row.get(0)?;
            Ok(value.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
