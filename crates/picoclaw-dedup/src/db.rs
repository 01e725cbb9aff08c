use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `dedup_cache` schema in `conn` (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS dedup_cache (
            hash        TEXT    NOT NULL,
            hash_type   TEXT    NOT NULL,
            seen_at     TEXT    NOT NULL,
            expires_at  TEXT    NOT NULL,
            PRIMARY KEY (hash, hash_type)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_dedup_cache_expires ON dedup_cache (expires_at);
        ",
    )?;
    Ok(())
}
