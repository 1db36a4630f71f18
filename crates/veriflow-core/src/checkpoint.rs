//! Named, restorable snapshots of a [`SprintState`].
//!
//! One JSON file per checkpoint name under the checkpoints directory. Reusing
//! a name overwrites the previous snapshot. Writes go through
//! [`crate::io::atomic_write`], so a crash leaves either the old file or the
//! new one.

use crate::error::{Result, VeriflowError};
use crate::io;
use crate::paths;
use crate::state::SprintState;
use crate::types::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    /// Owned copy of the live state at creation time.
    pub state: SprintState,
}

/// Listing entry without the embedded state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub name: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub sprint_number: u32,
    pub completed_stages: usize,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            name: cp.name.clone(),
            description: cp.description.clone(),
            timestamp: cp.timestamp,
            stage: cp.stage,
            sprint_number: cp.state.sprint_number,
            completed_stages: cp.state.completed_stages.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        paths::validate_checkpoint_name(name).is_ok() && self.file(name).exists()
    }

    /// Snapshot `state` under `name`, overwriting any earlier checkpoint with
    /// the same name.
    pub fn create(&self, name: &str, description: &str, state: &SprintState) -> Result<Checkpoint> {
        paths::validate_checkpoint_name(name)?;
        let checkpoint = Checkpoint {
            name: name.to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
            stage: state.current_stage,
            state: state.clone(),
        };
        io::write_json(&self.file(name), &checkpoint)?;
        tracing::info!(checkpoint = name, stage = %checkpoint.stage, "checkpoint written");
        Ok(checkpoint)
    }

    /// `Ok(None)` when no checkpoint with that name exists.
    pub fn load(&self, name: &str) -> Result<Option<Checkpoint>> {
        paths::validate_checkpoint_name(name)?;
        let path = self.file(name);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&data)?;
        Ok(Some(checkpoint))
    }

    /// The stored state with `current_stage` set to the checkpoint's stage.
    ///
    /// The snapshot predates its own history record, so the record is
    /// appended again: the restored state lists `name` as its last
    /// checkpoint.
    pub fn restore(&self, name: &str) -> Result<Option<SprintState>> {
        Ok(self.load(name)?.map(|cp| {
            let mut state = cp.state;
            state.current_stage = cp.stage;
            let recorded = state
                .last_checkpoint()
                .is_some_and(|r| r.name == cp.name && r.timestamp == cp.timestamp);
            if !recorded {
                state.record_checkpoint(&cp.name, cp.timestamp);
            }
            state
        }))
    }

    /// All checkpoints, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<CheckpointSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(VeriflowError::from)
                .and_then(|data| Ok(serde_json::from_str::<Checkpoint>(&data)?));
            match parsed {
                Ok(cp) => summaries.push(CheckpointSummary::from(&cp)),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable checkpoint"
                    );
                }
            }
        }
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.name.cmp(&b.name)));
        Ok(summaries)
    }

    /// Textual delta from checkpoint `from` to checkpoint `to`.
    pub fn diff(&self, from: &str, to: &str) -> Result<String> {
        let a = self
            .load(from)?
            .ok_or_else(|| VeriflowError::CheckpointNotFound(from.to_string()))?;
        let b = self
            .load(to)?
            .ok_or_else(|| VeriflowError::CheckpointNotFound(to.to_string()))?;
        Ok(diff_states(&a.name, &a.state, &b.name, &b.state))
    }
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Render the differences between two states, one line per change.
pub fn diff_states(
    from_label: &str,
    from: &SprintState,
    to_label: &str,
    to: &SprintState,
) -> String {
    let mut lines = vec![format!("--- {from_label}"), format!("+++ {to_label}")];

    if from.current_stage != to.current_stage {
        lines.push(format!(
            "~ current_stage: {} -> {}",
            from.current_stage, to.current_stage
        ));
    }
    if from.sprint_number != to.sprint_number {
        lines.push(format!(
            "~ sprint_number: {} -> {}",
            from.sprint_number, to.sprint_number
        ));
    }
    if from.active_story != to.active_story {
        let show = |s: &Option<serde_json::Value>| match s {
            Some(v) => v.to_string(),
            None => "none".to_string(),
        };
        lines.push(format!(
            "~ active_story: {} -> {}",
            show(&from.active_story),
            show(&to.active_story)
        ));
    }

    // completed_stages is append-only, so compare the shared prefix and report the tail.
    let common = from
        .completed_stages
        .iter()
        .zip(&to.completed_stages)
        .take_while(|(a, b)| a == b)
        .count();
    for stage in &from.completed_stages[common..] {
        lines.push(format!("- completed: {stage}"));
    }
    for stage in &to.completed_stages[common..] {
        lines.push(format!("+ completed: {stage}"));
    }

    let keys: BTreeSet<Stage> = from
        .stage_artifacts
        .keys()
        .chain(to.stage_artifacts.keys())
        .copied()
        .collect();
    for stage in keys {
        match (from.stage_artifacts.get(&stage), to.stage_artifacts.get(&stage)) {
            (Some(_), None) => lines.push(format!("- artifacts: {stage}")),
            (None, Some(_)) => lines.push(format!("+ artifacts: {stage}")),
            (Some(a), Some(b)) if a != b => lines.push(format!("~ artifacts: {stage}")),
            _ => {}
        }
    }

    if lines.len() == 2 {
        lines.push("(no differences)".to_string());
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn state_at(stage: Stage, completed: &[Stage]) -> SprintState {
        let mut state = SprintState::default();
        for s in completed {
            state.complete_stage(*s, json!({ "stage": s.as_str() }));
        }
        state.enter_stage(stage);
        state
    }

    #[test]
    fn create_then_restore() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let state = state_at(Stage::Design, &[Stage::Requirements, Stage::Design]);

        let cp = mgr.create("after_design", "design done", &state).unwrap();
        assert_eq!(cp.stage, Stage::Design);
        assert!(dir.path().join("after_design.json").exists());

        let restored = mgr.restore("after_design").unwrap().unwrap();
        assert_eq!(restored.current_stage, Stage::Design);
        assert_eq!(restored.completed_stages, state.completed_stages);
        assert_eq!(restored.stage_artifacts, state.stage_artifacts);
    }

    #[test]
    fn restore_keeps_the_checkpoints_own_record() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let mut state = state_at(Stage::Design, &[Stage::Requirements]);
        let earlier = Utc::now();
        state.record_checkpoint("before", earlier);

        let cp = mgr.create("after_requirements", "", &state).unwrap();
        let restored = mgr.restore("after_requirements").unwrap().unwrap();
        let names: Vec<&str> = restored
            .checkpoint_history
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["before", "after_requirements"]);
        assert_eq!(restored.last_checkpoint().unwrap().timestamp, cp.timestamp);

        // Restoring twice does not duplicate the record.
        let again = mgr.restore("after_requirements").unwrap().unwrap();
        assert_eq!(again.checkpoint_history.len(), 2);
    }

    #[test]
    fn restore_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        assert!(mgr.restore("nope").unwrap().is_none());
        assert!(!mgr.exists("nope"));
    }

    #[test]
    fn invalid_names_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let state = SprintState::default();
        assert!(matches!(
            mgr.create("../escape", "", &state),
            Err(VeriflowError::InvalidCheckpointName(_))
        ));
        assert!(mgr.load("a/b").is_err());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let mut state = state_at(Stage::Design, &[Stage::Design]);
        let cp = mgr.create("snap", "", &state).unwrap();

        state.complete_stage(Stage::Coding, json!({}));
        state.enter_stage(Stage::Coding);

        assert_eq!(cp.state.completed_stages, vec![Stage::Design]);
        let stored = mgr.load("snap").unwrap().unwrap();
        assert_eq!(stored.state.completed_stages, vec![Stage::Design]);
        assert_eq!(stored.stage, Stage::Design);
    }

    #[test]
    fn reusing_a_name_overwrites() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        mgr.create("cp", "first", &state_at(Stage::Design, &[]))
            .unwrap();
        mgr.create("cp", "second", &state_at(Stage::Coding, &[]))
            .unwrap();
        let cp = mgr.load("cp").unwrap().unwrap();
        assert_eq!(cp.description, "second");
        assert_eq!(cp.stage, Stage::Coding);
        assert_eq!(mgr.list().unwrap().len(), 1);
    }

    #[test]
    fn list_is_newest_first_and_skips_garbage() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        mgr.create("one", "", &SprintState::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        mgr.create("two", "", &SprintState::default()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "nope").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let names: Vec<String> = mgr.list().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["two", "one"]);
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path().join("absent"));
        assert!(mgr.list().unwrap().is_empty());
    }

    #[test]
    fn diff_reports_changes() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        mgr.create("a", "", &state_at(Stage::Design, &[Stage::Requirements, Stage::Design]))
            .unwrap();
        mgr.create(
            "b",
            "",
            &state_at(
                Stage::Coding,
                &[Stage::Requirements, Stage::Design, Stage::Coding],
            ),
        )
        .unwrap();

        let diff = mgr.diff("a", "b").unwrap();
        assert!(diff.starts_with("--- a\n+++ b"));
        assert!(diff.contains("~ current_stage: design -> coding"));
        assert!(diff.contains("+ completed: coding"));
        assert!(diff.contains("+ artifacts: coding"));
        assert!(!diff.contains("requirements"));
    }

    #[test]
    fn diff_identical_and_missing() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        mgr.create("a", "", &SprintState::default()).unwrap();
        let diff = mgr.diff("a", "a").unwrap();
        assert!(diff.ends_with("(no differences)"));
        assert!(matches!(
            mgr.diff("a", "missing"),
            Err(VeriflowError::CheckpointNotFound(name)) if name == "missing"
        ));
    }
}
