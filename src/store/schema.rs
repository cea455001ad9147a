//! Database schema definitions
//!
//! This module contains the SQL schema for the Cirrus result store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Products accepted by the match rule
CREATE TABLE IF NOT EXISTS goods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    comments INTEGER NOT NULL,
    express TEXT NOT NULL,
    -- Unix milliseconds, so time windows compare numerically
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_goods_uid ON goods(uid);
CREATE INDEX IF NOT EXISTS idx_goods_timestamp ON goods(timestamp);
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
