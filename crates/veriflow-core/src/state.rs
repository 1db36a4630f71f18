use crate::error::Result;
use crate::io;
use crate::types::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SprintState
// ---------------------------------------------------------------------------

/// The orchestrator's persisted document.
///
/// All fields are owned values, so `clone()` is a deep copy: a snapshot
/// taken with `clone()` never observes later mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub current_stage: Stage,
    pub sprint_number: u32,
    /// Append-only; a stage appears once per successful execution.
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
    #[serde(default)]
    pub active_story: Option<Value>,
    #[serde(default)]
    pub stage_artifacts: BTreeMap<Stage, Value>,
    #[serde(default)]
    pub checkpoint_history: Vec<CheckpointRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl Default for SprintState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            current_stage: Stage::Planning,
            sprint_number: 0,
            completed_stages: Vec::new(),
            active_story: None,
            stage_artifacts: BTreeMap::new(),
            checkpoint_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl SprintState {
    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn begin_sprint(&mut self, story: Value) -> u32 {
        self.sprint_number += 1;
        self.active_story = Some(story);
        self.sprint_number
    }

    pub fn end_sprint(&mut self) {
        self.active_story = None;
    }

    pub fn enter_stage(&mut self, stage: Stage) {
        self.current_stage = stage;
    }

    pub fn complete_stage(&mut self, stage: Stage, artifacts: Value) {
        self.completed_stages.push(stage);
        self.stage_artifacts.insert(stage, artifacts);
    }

    pub fn record_checkpoint(&mut self, name: &str, timestamp: DateTime<Utc>) {
        self.checkpoint_history.push(CheckpointRecord {
            name: name.to_string(),
            timestamp,
        });
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    pub fn artifacts_for(&self, stage: Stage) -> Option<&Value> {
        self.stage_artifacts.get(&stage)
    }

    pub fn last_checkpoint(&self) -> Option<&CheckpointRecord> {
        self.checkpoint_history.last()
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Reads and writes one `SprintState` JSON file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the state, or a fresh default when the file is missing or
    /// unreadable. A corrupted file is left on disk and replaced on the next
    /// save.
    pub fn load(&self) -> SprintState {
        if !self.path.exists() {
            return SprintState::default();
        }
        let parsed = std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|data| serde_json::from_str(&data).map_err(|e| e.to_string()));
        match parsed {
            Ok(state) => state,
            Err(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %reason,
                    "state file unreadable, starting from a fresh state"
                );
                SprintState::default()
            }
        }
    }

    /// Stamp `updated_at` and write the document atomically.
    pub fn save(&self, state: &mut SprintState) -> Result<()> {
        state.updated_at = Utc::now();
        io::write_json(&self.path, state)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
