//! Database schema definitions
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text (microsecond
//! precision), so lexical order equals chronological order.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per tracked entity
CREATE TABLE IF NOT EXISTS frontier (
    entity_id INTEGER PRIMARY KEY,
    latest_content_id INTEGER,
    content_last_fetched_at TEXT,
    relations_last_fetched_at TEXT,
    is_seed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    content_claim TEXT,
    content_claim_expires TEXT,
    relations_claim TEXT,
    relations_claim_expires TEXT
);

CREATE INDEX IF NOT EXISTS idx_frontier_content ON frontier(content_last_fetched_at);
CREATE INDEX IF NOT EXISTS idx_frontier_relations ON frontier(is_seed, relations_last_fetched_at);

-- Journal of executor sessions
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    unavailable INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    items INTEGER NOT NULL DEFAULT 0,
    stop_reason TEXT
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
