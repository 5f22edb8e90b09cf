//! Checkpoint writer/loader (C9): whole-`CurriculumState` snapshots written
//! between flywheel iterations so a crashed run can resume without
//! replaying from iteration zero (§4.8 "crash recovery").

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{Error, Result};
use crate::flywheel::CurriculumState;

const CHECKPOINT_DIR: &str = "checkpoints";

fn checkpoint_path(run_dir: &Path, iteration: u32) -> PathBuf {
    run_dir.join(CHECKPOINT_DIR).join(format!("iter_{iteration:04}.json"))
}

/// Write `state` to `checkpoints/iter_NNNN.json`, creating the directory if
/// needed. Writes the whole file in one call rather than appending, since a
/// checkpoint is a full-state snapshot, not a log record.
pub async fn write(run_dir: &Path, state: &CurriculumState) -> Result<()> {
    let dir = run_dir.join(CHECKPOINT_DIR);
    fs::create_dir_all(&dir).await?;
    let path = checkpoint_path(run_dir, state.iteration);
    let bytes = serde_json::to_vec_pretty(state)?;
    fs::write(&path, bytes).await?;
    Ok(())
}

/// Load the most recent checkpoint under `run_dir`, if any. On restart the
/// interrupted iteration is replayed from its start rather than resumed
/// mid-iteration — the caller re-enters the loop at `state.iteration`.
pub async fn load_latest(run_dir: &Path) -> Result<Option<CurriculumState>> {
    let dir = run_dir.join(CHECKPOINT_DIR);
    if !dir.exists() {
        return Ok(None);
    }

    let mut entries = fs::read_dir(&dir).await?;
    let mut latest: Option<(u32, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(iteration_str) = stem.strip_prefix("iter_") else {
            continue;
        };
        let Ok(iteration) = iteration_str.parse::<u32>() else {
            continue;
        };
        if latest.as_ref().map(|(i, _)| iteration > *i).unwrap_or(true) {
            latest = Some((iteration, path));
        }
    }

    match latest {
        Some((_, path)) => {
            let text = fs::read_to_string(&path).await?;
            let state: CurriculumState = serde_json::from_str(&text)
                .map_err(|e| Error::persistence(format!("corrupt checkpoint {path:?}: {e}")))?;
            Ok(Some(state))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flywheel::{FocusArea, StrategyRecord};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn loads_the_highest_numbered_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut early = CurriculumState::new("finance");
        early.iteration = 1;
        let mut late = CurriculumState::new("finance");
        late.iteration = 5;

        write(dir.path(), &early).await.unwrap();
        write(dir.path(), &late).await.unwrap();

        let loaded = load_latest(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded.iteration, 5);
    }

    #[tokio::test]
    async fn missing_checkpoint_directory_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_latest(dir.path()).await.unwrap().is_none());
    }

    /// A checkpoint round-trips the whole state, not just the fields the
    /// other tests happen to check — `pretty_assertions` gives a field-level
    /// diff if some part of the state silently fails to serialise.
    #[tokio::test]
    async fn round_trip_preserves_the_whole_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = CurriculumState::new("finance");
        state.iteration = 3;
        state.cumulative_cost_usd = 12.5;
        state.learning_progress.insert("pii".to_string(), 0.42);
        state.mastered.insert("aml".to_string());
        state.mastery_streak.insert("pii".to_string(), 2);
        state.last_strategy = Some(StrategyRecord {
            focus_area: FocusArea::Pii,
            rationale: "focus on PII leakage".to_string(),
        });
        state.overall_pass_rate_history.push(0.7);
        state.overall_pass_rate_history.push(0.8);

        write(dir.path(), &state).await.unwrap();
        let loaded = load_latest(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }
}
