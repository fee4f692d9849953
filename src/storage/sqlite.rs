//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DiscoveryStore trait.

use crate::category::{CategoryNode, NodeStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DiscoveryStore, StorageError, StorageResult};
use crate::storage::{NodeRecord, RunRecord, RunStatus};
use crate::SweepError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const NODE_COLUMNS: &str = "category_id, url, path_segments, children, item_count, is_listing,
     status, basis_seq, visited_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

/// Node columns as read from a row, before JSON decoding
struct RawNode {
    id: String,
    url: String,
    path_segments: String,
    children: String,
    item_count: Option<i64>,
    is_listing: bool,
    status: String,
    basis_seq: Option<i64>,
    visited_at: Option<String>,
}

impl SqliteStorage {
    /// Opens (or creates) a database file
    pub fn new(path: &Path) -> Result<Self, SweepError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, SweepError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn map_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            pagination_limit: row.get::<_, i64>(4)?.max(0) as u64,
            status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
                .unwrap_or(RunStatus::Interrupted),
        })
    }

    fn map_raw_node(row: &Row<'_>) -> rusqlite::Result<RawNode> {
        Ok(RawNode {
            id: row.get(0)?,
            url: row.get(1)?,
            path_segments: row.get(2)?,
            children: row.get(3)?,
            item_count: row.get(4)?,
            is_listing: row.get(5)?,
            status: row.get(6)?,
            basis_seq: row.get(7)?,
            visited_at: row.get(8)?,
        })
    }

    fn decode_node(raw: RawNode) -> StorageResult<NodeRecord> {
        let status =
            NodeStatus::from_db_string(&raw.status).ok_or_else(|| StorageError::CorruptRecord {
                id: raw.id.clone(),
                reason: format!("unknown status '{}'", raw.status),
            })?;

        Ok(NodeRecord {
            node: CategoryNode {
                id: raw.id,
                url: raw.url,
                path_segments: serde_json::from_str(&raw.path_segments)?,
                parent_id: None,
                children: serde_json::from_str(&raw.children)?,
                item_count: raw.item_count.map(|count| count.max(0) as u64),
                status,
            },
            is_listing: raw.is_listing,
            basis_seq: raw.basis_seq,
            visited_at: raw.visited_at,
        })
    }

    fn query_nodes(&self, sql: &str, run_id: i64) -> StorageResult<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map(params![run_id], Self::map_raw_node)?
            .collect::<Result<Vec<_>, _>>()?;

        raws.into_iter().map(Self::decode_node).collect()
    }
}

impl DiscoveryStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, pagination_limit: u64) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, pagination_limit, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                now,
                config_hash,
                pagination_limit as i64,
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, pagination_limit, status
                 FROM runs WHERE id = ?1",
                params![run_id],
                Self::map_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, pagination_limit, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                Self::map_run,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Progress =====

    fn save_progress(
        &mut self,
        run_id: i64,
        nodes: &[NodeRecord],
        frontier: &[String],
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        {
            let mut upsert = tx.prepare(
                "INSERT INTO nodes (run_id, category_id, url, path_segments, children, item_count,
                     is_listing, status, basis_seq, visited_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(run_id, category_id) DO UPDATE SET
                     url = excluded.url,
                     path_segments = excluded.path_segments,
                     children = excluded.children,
                     item_count = excluded.item_count,
                     is_listing = excluded.is_listing,
                     status = excluded.status,
                     basis_seq = excluded.basis_seq,
                     visited_at = excluded.visited_at",
            )?;

            for record in nodes {
                let node = &record.node;
                upsert.execute(params![
                    run_id,
                    node.id,
                    node.url,
                    serde_json::to_string(&node.path_segments)?,
                    serde_json::to_string(&node.children)?,
                    node.item_count.map(|count| count as i64),
                    record.is_listing,
                    node.status.to_db_string(),
                    record.basis_seq,
                    record.visited_at,
                ])?;
            }

            tx.execute("DELETE FROM frontier WHERE run_id = ?1", params![run_id])?;
            let mut insert_frontier = tx.prepare(
                "INSERT INTO frontier (run_id, position, category_id) VALUES (?1, ?2, ?3)",
            )?;
            for (position, id) in frontier.iter().enumerate() {
                insert_frontier.execute(params![run_id, position as i64, id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_nodes(&self, run_id: i64) -> StorageResult<Vec<NodeRecord>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM nodes WHERE run_id = ?1 ORDER BY rowid",
                NODE_COLUMNS
            ),
            run_id,
        )
    }

    fn load_frontier(&self, run_id: i64) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT category_id FROM frontier WHERE run_id = ?1 ORDER BY position ASC",
        )?;

        let ids = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    fn load_basis(&self, run_id: i64) -> StorageResult<Vec<NodeRecord>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM nodes WHERE run_id = ?1 AND basis_seq IS NOT NULL
                 ORDER BY basis_seq ASC",
                NODE_COLUMNS
            ),
            run_id,
        )
    }

    // ===== Statistics =====

    fn count_nodes_by_status(&self, run_id: i64, status: NodeStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE run_id = ?1 AND status = ?2",
            params![run_id, status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_total_nodes(&self, run_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, status: NodeStatus, count: Option<u64>, seq: Option<i64>) -> NodeRecord {
        let mut node = CategoryNode::from_url(url).unwrap();
        node.status = status;
        node.item_count = count;
        NodeRecord {
            node,
            is_listing: status == NodeStatus::Basis,
            basis_seq: seq,
            visited_at: None,
        }
    }

    #[test]
    fn test_create_and_get_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let run_id = storage.create_run("abc123", 2000).unwrap();

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.config_hash, "abc123");
        assert_eq!(run.pagination_limit, 2000);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_complete_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let run_id = storage.create_run("abc123", 2000).unwrap();
        storage.complete_run(run_id).unwrap();

        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run_id);
        assert_eq!(latest.status, RunStatus::Completed);
        assert!(latest.finished_at.is_some());
    }

    #[test]
    fn test_missing_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        assert!(matches!(
            storage.get_run(42).unwrap_err(),
            StorageError::RunNotFound(42)
        ));
        assert!(storage.update_run_status(42, RunStatus::Failed).is_err());
    }

    #[test]
    fn test_save_and_load_progress() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let run_id = storage.create_run("h", 2000).unwrap();

        let mut hub = record("https://shop.example.com/c/grocery/1000", NodeStatus::Hub, Some(0), None);
        hub.node.children = vec!["1100".to_string(), "1200".to_string()];
        let nodes = vec![
            hub,
            record("https://shop.example.com/c/grocery/dairy/1100", NodeStatus::Basis, Some(800), Some(0)),
            record("https://shop.example.com/c/grocery/bakery/1200", NodeStatus::Unvisited, None, None),
        ];
        storage
            .save_progress(run_id, &nodes, &["1200".to_string()])
            .unwrap();

        let loaded = storage.load_nodes(run_id).unwrap();
        assert_eq!(loaded, nodes);
        assert_eq!(storage.load_frontier(run_id).unwrap(), vec!["1200"]);

        let basis = storage.load_basis(run_id).unwrap();
        assert_eq!(basis.len(), 1);
        assert_eq!(basis[0].node.id, "1100");

        assert_eq!(storage.count_total_nodes(run_id).unwrap(), 3);
        assert_eq!(
            storage.count_nodes_by_status(run_id, NodeStatus::Hub).unwrap(),
            1
        );
    }

    #[test]
    fn test_save_progress_replaces_frontier_and_updates_nodes() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let run_id = storage.create_run("h", 2000).unwrap();

        let queued = record("https://shop.example.com/c/grocery/bakery/1200", NodeStatus::Unvisited, None, None);
        storage
            .save_progress(run_id, &[queued], &["1200".to_string()])
            .unwrap();

        let visited = record("https://shop.example.com/c/grocery/bakery/1200", NodeStatus::Basis, Some(10), Some(0));
        storage.save_progress(run_id, &[visited], &[]).unwrap();

        assert!(storage.load_frontier(run_id).unwrap().is_empty());
        let loaded = storage.load_nodes(run_id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].node.status, NodeStatus::Basis);
        assert_eq!(loaded[0].node.item_count, Some(10));
    }

    #[test]
    fn test_runs_are_isolated() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let first = storage.create_run("h", 2000).unwrap();
        let second = storage.create_run("h", 2000).unwrap();

        let node = record("https://shop.example.com/c/grocery/1000", NodeStatus::Hub, Some(0), None);
        storage.save_progress(first, &[node], &[]).unwrap();

        assert_eq!(storage.count_total_nodes(first).unwrap(), 1);
        assert_eq!(storage.count_total_nodes(second).unwrap(), 0);
    }
}
