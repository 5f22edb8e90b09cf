//! Append-only event log (C9): every judgement, prediction, checkpoint, and
//! cost event is serialised as one JSON object per line and fsync'd at the
//! write site, matching spec §5's "multiple-writer, append-only; serialised
//! at the write site" concurrency contract.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader, AsyncBufReadExt};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::judge::JudgementResult;
use crate::predictor::ReliabilityPrediction;
use tracing::debug;

const EVENTS_FILE: &str = "events.jsonl";

/// One line of the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Judgement(JudgementResult),
    Prediction(ReliabilityPrediction),
    Checkpoint { iteration: u32 },
    Cost { total_usd: f64, request_count: u64 },
}

/// A `tokio::fs`-based append-only writer, serialising concurrent writers
/// behind a single `Mutex` rather than a lock-free append (matching the
/// teacher's `SqliteMemoryStore::with_conn` single-lock-around-every-write
/// shape, here applied to a plain file instead of a SQLite connection).
pub struct EventLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl EventLog {
    pub async fn open(run_dir: impl AsRef<Path>) -> Result<Self> {
        let run_dir = run_dir.as_ref();
        tokio::fs::create_dir_all(run_dir).await?;
        let path = run_dir.join(EVENTS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one event as a single JSON line, fsync'd before returning so
    /// no reader ever observes a partial record.
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_all().await?;
        debug!(bytes = line.len(), "appended event");
        Ok(())
    }

    /// Replay every event recorded so far, in write order. Used by crash
    /// recovery and by tests asserting on what was durably recorded.
    pub async fn replay(&self) -> Result<Vec<Event>> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .map_err(|e| Error::persistence(format!("corrupt event log line: {e}")))?;
            events.push(event);
        }
        Ok(events)
    }
}
