//! On-disk session index readers: the agent CLI owns its own transcript
//! store; the supervisor only reads a discovery index out of it for `list`.
//!
//! Two formats are supported, mirroring the teacher's defensive
//! `TasksFile::load` ("return empty if file doesn't exist", never fail the
//! caller): a single append-only JSONL file, and a date-partitioned
//! directory tree `.../YYYY/MM/DD/<id>.jsonl` whose first line carries the
//! session id.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub project: Option<String>,
    pub display: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonlRow {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    /// The partitioned format's first line names the id `id` rather than
    /// `session_id`; accept either.
    #[serde(default)]
    id: Option<String>,
}

/// Read a single append-only JSONL file. Missing or unreadable paths read
/// as empty; malformed rows are skipped, not fatal.
pub async fn read_jsonl_file(path: &Path) -> Vec<IndexEntry> {
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return Vec::new();
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_row)
        .collect()
}

/// Walk a `YYYY/MM/DD/<id>.jsonl` tree, reading just the first line of each
/// file (the `Init`-like entry carrying the id). Missing root reads as
/// empty.
pub async fn read_partitioned_tree(root: &Path) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    let mut years = match tokio::fs::read_dir(root).await {
        Ok(d) => d,
        Err(_) => return entries,
    };

    let mut year_dirs = Vec::new();
    while let Ok(Some(entry)) = years.next_entry().await {
        if entry.path().is_dir() {
            year_dirs.push(entry.path());
        }
    }

    for year_dir in year_dirs {
        let Ok(mut months) = tokio::fs::read_dir(&year_dir).await else {
            continue;
        };
        let mut month_dirs = Vec::new();
        while let Ok(Some(entry)) = months.next_entry().await {
            if entry.path().is_dir() {
                month_dirs.push(entry.path());
            }
        }

        for month_dir in month_dirs {
            let Ok(mut days) = tokio::fs::read_dir(&month_dir).await else {
                continue;
            };
            let mut day_dirs = Vec::new();
            while let Ok(Some(entry)) = days.next_entry().await {
                if entry.path().is_dir() {
                    day_dirs.push(entry.path());
                }
            }

            for day_dir in day_dirs {
                let Ok(mut files) = tokio::fs::read_dir(&day_dir).await else {
                    continue;
                };
                while let Ok(Some(entry)) = files.next_entry().await {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                        continue;
                    }
                    if let Some(entry) = read_first_line(&path).await {
                        entries.push(entry);
                    }
                }
            }
        }
    }

    entries
}

async fn read_first_line(path: &Path) -> Option<IndexEntry> {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let file = tokio::fs::File::open(path).await.ok()?;
    let mut lines = BufReader::new(file).lines();
    let first = lines.next_line().await.ok()??;
    parse_row(&first)
}

fn parse_row(line: &str) -> Option<IndexEntry> {
    let row: JsonlRow = match serde_json::from_str(line) {
        Ok(row) => row,
        Err(err) => {
            tracing::debug!("skipping malformed session index row: {}", err);
            return None;
        }
    };
    let session_id = row.session_id.or(row.id)?;
    Some(IndexEntry {
        session_id,
        timestamp: row.timestamp.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC),
        project: row.project,
        display: row.display,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_jsonl_file_reads_as_empty() {
        let entries = read_jsonl_file(Path::new("/nonexistent/path.jsonl")).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn missing_partitioned_root_reads_as_empty() {
        let entries = read_partitioned_tree(Path::new("/nonexistent/root")).await;
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.jsonl");
        tokio::fs::write(
            &path,
            "not json\n{\"session_id\":\"s1\",\"project\":\"/tmp/proj\"}\n",
        )
        .await
        .unwrap();

        let entries = read_jsonl_file(&path).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session_id, "s1");
    }

    #[tokio::test]
    async fn partitioned_tree_reads_first_line_of_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("2026").join("07").join("28");
        tokio::fs::create_dir_all(&day_dir).await.unwrap();
        tokio::fs::write(
            day_dir.join("sess-1.jsonl"),
            "{\"id\":\"sess-1\",\"project\":\"/tmp/proj\"}\n{\"ignored\":true}\n",
        )
        .await
        .unwrap();

        let entries = read_partitioned_tree(dir.path()).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session_id, "sess-1");
    }
}
