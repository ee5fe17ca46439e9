//! Best-effort history of completed actions. Recording is a detached task:
//! the engine never waits on it and failures are swallowed, logged at
//! debug only. The local file sink is capped (oldest evicted first); the
//! remote sink is unbounded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub chain_id: u64,
    pub tx_hash: Option<String>,
    pub sell_symbol: String,
    pub sell_amount: String,
    pub buy_symbol: String,
    pub buy_amount: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait HistorySink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()>;
}

/// JSON file on disk holding the most recent `cap` entries.
pub struct FileHistory {
    path: PathBuf,
    cap: usize,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl FileHistory {
    pub fn open(path: PathBuf, cap: usize) -> Self {
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<HistoryEntry>>(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            cap,
            entries: Mutex::new(entries),
        }
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    fn persist(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[async_trait]
impl HistorySink for FileHistory {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        let snapshot = {
            let mut entries = self.entries.lock();
            entries.push(entry.clone());
            while entries.len() > self.cap {
                entries.remove(0);
            }
            entries.clone()
        };
        self.persist(&snapshot)
    }
}

/// POSTs each record to a collector endpoint.
pub struct RemoteHistory {
    http: reqwest::Client,
    url: String,
}

impl RemoteHistory {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl HistorySink for RemoteHistory {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.http
            .post(&self.url)
            .json(entry)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Fan-out over the configured sinks, fire-and-forget.
#[derive(Default)]
pub struct HistoryLog {
    sinks: Vec<Arc<dyn HistorySink>>,
}

impl HistoryLog {
    pub fn new(sinks: Vec<Arc<dyn HistorySink>>) -> Self {
        Self { sinks }
    }

    pub fn record_detached(&self, entry: HistoryEntry) {
        for sink in &self.sinks {
            let sink = sink.clone();
            let entry = entry.clone();
            tokio::spawn(async move {
                if let Err(err) = sink.append(&entry).await {
                    debug!(sink = sink.name(), %err, "history write failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> HistoryEntry {
        HistoryEntry {
            chain_id: 1,
            tx_hash: Some(format!("0x{n:02x}")),
            sell_symbol: "USDC".to_string(),
            sell_amount: "10".to_string(),
            buy_symbol: "WETH".to_string(),
            buy_amount: "0.003".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn file_history_caps_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let history = FileHistory::open(path.clone(), 3);
        for n in 0..5 {
            history.append(&entry(n)).await.unwrap();
        }
        let entries = history.entries();
        assert_eq!(entries.len(), 3);
        // Oldest evicted first.
        assert_eq!(entries[0].tx_hash.as_deref(), Some("0x02"));
        assert_eq!(entries[2].tx_hash.as_deref(), Some("0x04"));

        // Entries survive a reopen.
        let reopened = FileHistory::open(path, 3);
        assert_eq!(reopened.entries().len(), 3);
    }

    struct FailingSink;

    #[async_trait]
    impl HistorySink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn append(&self, _entry: &HistoryEntry) -> anyhow::Result<()> {
            anyhow::bail!("collector offline")
        }
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let log = HistoryLog::new(vec![Arc::new(FailingSink)]);
        log.record_detached(entry(1));
        // Give the detached task a chance to run; nothing to assert beyond
        // the absence of a panic or a propagated error.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json").unwrap();
        let history = FileHistory::open(path, 3);
        assert!(history.entries().is_empty());
    }
}
