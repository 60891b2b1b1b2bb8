//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the oid-walker database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Resolved records, one per identifier
CREATE TABLE IF NOT EXISTS mib (
    uid INTEGER PRIMARY KEY AUTOINCREMENT,
    oid VARCHAR(64) NOT NULL UNIQUE,
    name VARCHAR(64) NOT NULL,
    sub_ch INTEGER NOT NULL DEFAULT 0,
    sub_total INTEGER NOT NULL DEFAULT 0,
    descr VARCHAR(100) NOT NULL DEFAULT '',
    inf VARCHAR(100) NOT NULL DEFAULT '-',
    persisted_at TEXT NOT NULL
);

-- Durable frontier: discovered but not yet finalized
CREATE TABLE IF NOT EXISTS pending (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    oid VARCHAR(64) NOT NULL,
    leased INTEGER NOT NULL DEFAULT 0,
    -- Record from the parent page; NULL name when none was resolved
    name VARCHAR(64),
    sub_ch INTEGER,
    sub_total INTEGER,
    descr VARCHAR(100),
    inf VARCHAR(100)
);

CREATE INDEX IF NOT EXISTS idx_pending_oid ON pending(oid);
CREATE INDEX IF NOT EXISTS idx_pending_leased ON pending(leased, id);
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
