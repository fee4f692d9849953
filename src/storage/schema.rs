//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the discovery database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track discovery runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    pagination_limit INTEGER NOT NULL,
    status TEXT NOT NULL
);

-- Every category node known to a run (visited or still queued)
CREATE TABLE IF NOT EXISTS nodes (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    category_id TEXT NOT NULL,
    url TEXT NOT NULL,
    path_segments TEXT NOT NULL,
    children TEXT NOT NULL DEFAULT '[]',
    item_count INTEGER,
    is_listing INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    basis_seq INTEGER,
    visited_at TEXT,
    PRIMARY KEY (run_id, category_id)
);

CREATE INDEX IF NOT EXISTS idx_nodes_status ON nodes(run_id, status);
CREATE INDEX IF NOT EXISTS idx_nodes_basis ON nodes(run_id, basis_seq);

-- Discovery frontier snapshot, in queue order
CREATE TABLE IF NOT EXISTS frontier (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    position INTEGER NOT NULL,
    category_id TEXT NOT NULL,
    PRIMARY KEY (run_id, position)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
