//! Persistence Layer (C9). Per spec's file-layout contract ("no database
//! required"): `events.jsonl` (append-only), `checkpoints/iter_NNNN.json`
//! (whole-state snapshots), `final_report.json`. Patterns are the one
//! exception — a genuinely keyed, queryable store — and are kept in a
//! `rusqlite` database instead (`pattern_store.rs`), an explicit split spec
//! §6 itself allows ("any store exposing append-only byte streams + keyed
//! puts suffices").

pub mod checkpoint;
pub mod event_log;
pub mod pattern_store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::flywheel::CurriculumState;
use crate::judge::JudgementResult;
use crate::predictor::ReliabilityPrediction;

pub use event_log::{Event, EventLog};
pub use pattern_store::PatternStore;

const FINAL_REPORT_FILE: &str = "final_report.json";
const PATTERN_STORE_FILE: &str = "patterns.sqlite3";

/// Ties the event log, checkpoint directory, final-report writer, and
/// pattern store to a single run directory. Every write path serialises
/// through `EventLog`'s own mutex (or `PatternStore`'s own, for patterns);
/// checkpoints and the final report are whole-file writes with no
/// concurrent-writer contract beyond "last write wins" since only the
/// flywheel controller ever calls them.
pub struct PersistenceLayer {
    run_dir: PathBuf,
    events: EventLog,
    patterns: Arc<PatternStore>,
}

impl PersistenceLayer {
    pub async fn open(run_dir: impl Into<PathBuf>) -> Result<Self> {
        let run_dir = run_dir.into();
        tokio::fs::create_dir_all(&run_dir).await?;
        let events = EventLog::open(&run_dir).await?;
        let patterns = Arc::new(PatternStore::open(run_dir.join(PATTERN_STORE_FILE))?);
        Ok(Self { run_dir, events, patterns })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// The keyed store backing C7's pattern persistence (§4.9's one
    /// explicit carve-out from the append-only JSONL layout).
    pub fn pattern_store(&self) -> Arc<PatternStore> {
        self.patterns.clone()
    }

    pub async fn append_judgement(&self, result: &JudgementResult) -> Result<()> {
        self.events.append(&Event::Judgement(result.clone())).await
    }

    pub async fn append_prediction(&self, prediction: &ReliabilityPrediction) -> Result<()> {
        self.events.append(&Event::Prediction(prediction.clone())).await
    }

    pub async fn append_cost(&self, total_usd: f64, request_count: u64) -> Result<()> {
        self.events
            .append(&Event::Cost { total_usd, request_count })
            .await
    }

    pub async fn write_checkpoint(&self, state: &CurriculumState) -> Result<()> {
        checkpoint::write(&self.run_dir, state).await?;
        self.events
            .append(&Event::Checkpoint { iteration: state.iteration })
            .await
    }

    pub async fn load_latest_checkpoint(&self) -> Result<Option<CurriculumState>> {
        checkpoint::load_latest(&self.run_dir).await
    }

    pub async fn write_final_report(&self, report: &crate::flywheel::FlywheelReport) -> Result<()> {
        let path = self.run_dir.join(FINAL_REPORT_FILE);
        let bytes = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    pub async fn replay_events(&self) -> Result<Vec<Event>> {
        self.events.replay().await
    }
}
