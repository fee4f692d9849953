//! Output sinks for scraped items
//!
//! A worker owns exactly one sink; records are appended one JSON object per
//! line and flushed after each category.

use crate::SweepError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One scraped item for one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub store_id: String,
    pub category_url: String,
    pub item_url: String,
    pub title: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// Append-only destination for item records
pub trait OutputSink: Send {
    fn append(&mut self, record: &ItemRecord) -> Result<(), SweepError>;

    /// Makes every appended record durable
    fn flush(&mut self) -> Result<(), SweepError>;
}

/// Appends records as JSON lines to a file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating parent directories
    pub fn open(path: &Path) -> Result<Self, SweepError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for JsonLinesSink {
    fn append(&mut self, record: &ItemRecord) -> Result<(), SweepError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SweepError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ItemRecord>,
    pub flushes: usize,
}

impl OutputSink for MemorySink {
    fn append(&mut self, record: &ItemRecord) -> Result<(), SweepError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SweepError> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(item: &str) -> ItemRecord {
        ItemRecord {
            store_id: "store-101".to_string(),
            category_url: "https://shop.example.com/c/a/1".to_string(),
            item_url: format!("https://shop.example.com/p/{}", item),
            title: Some(format!("Item {}", item)),
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn test_json_lines_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("store-101.jsonl");

        {
            let mut sink = JsonLinesSink::open(&path).unwrap();
            sink.append(&record("1")).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = JsonLinesSink::open(&path).unwrap();
            sink.append(&record("2")).unwrap();
            sink.flush().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["storeId"], "store-101");
        assert_eq!(second["itemUrl"], "https://shop.example.com/p/2");
        assert!(second["scrapedAt"].is_string());
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::default();
        sink.append(&record("1")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.flushes, 1);
    }
}
