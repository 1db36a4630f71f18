use crate::error::{Result, VeriflowError};
use crate::io;
use crate::types::Stage;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const VERIFLOW_DIR: &str = ".veriflow";
pub const WORKFLOWS_DIR: &str = "workflows";
pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const SPRINTS_DIR: &str = "sprints";

pub const CONFIG_FILE: &str = "config.yaml";
pub const STATE_FILE: &str = "state.json";

// ---------------------------------------------------------------------------
// ProjectPaths
// ---------------------------------------------------------------------------

/// Storage locations for one orchestrator.
///
/// The project layout keeps everything under `<root>/.veriflow/`. A workflow
/// layout nests state, checkpoints, artifacts and sprint reports under
/// `<root>/.veriflow/workflows/<id>/` while sharing the project config, so
/// independent orchestrators never touch each other's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
    base: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let base = root.join(VERIFLOW_DIR);
        Self { root, base }
    }

    pub fn for_workflow(root: impl Into<PathBuf>, workflow_id: &str) -> Result<Self> {
        validate_workflow_id(workflow_id)?;
        let root = root.into();
        let base = root.join(VERIFLOW_DIR).join(WORKFLOWS_DIR).join(workflow_id);
        Ok(Self { root, base })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn veriflow_dir(&self) -> PathBuf {
        self.root.join(VERIFLOW_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.veriflow_dir().join(CONFIG_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.base.join(STATE_FILE)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.base.join(CHECKPOINTS_DIR)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.base.join(ARTIFACTS_DIR)
    }

    pub fn stage_artifact_file(&self, sprint_number: u32, stage: Stage) -> PathBuf {
        self.artifacts_dir()
            .join(format!("sprint-{sprint_number}"))
            .join(format!("{}.json", stage.as_str()))
    }

    pub fn sprints_dir(&self) -> PathBuf {
        self.base.join(SPRINTS_DIR)
    }

    pub fn sprint_report_file(&self, sprint_number: u32) -> PathBuf {
        self.sprints_dir().join(format!("sprint-{sprint_number}.json"))
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file().exists()
    }

    /// Create every directory of the layout. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.veriflow_dir(),
            self.base.clone(),
            self.checkpoints_dir(),
            self.artifacts_dir(),
            self.sprints_dir(),
        ] {
            io::ensure_dir(&dir)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static CHECKPOINT_NAME_RE: OnceLock<Regex> = OnceLock::new();
static WORKFLOW_ID_RE: OnceLock<Regex> = OnceLock::new();

fn checkpoint_name_re() -> &'static Regex {
    CHECKPOINT_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").unwrap())
}

fn workflow_id_re() -> &'static Regex {
    WORKFLOW_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

/// Checkpoint names become file names, so they must not contain separators.
pub fn validate_checkpoint_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !checkpoint_name_re().is_match(name) {
        return Err(VeriflowError::InvalidCheckpointName(name.to_string()));
    }
    Ok(())
}

pub fn validate_workflow_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !workflow_id_re().is_match(id) {
        return Err(VeriflowError::InvalidWorkflowId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
