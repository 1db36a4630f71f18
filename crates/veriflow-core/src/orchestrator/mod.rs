//! The V-Model stage machine.
//!
//! ```text
//! run_sprint(story)
//!     │  sprint_number += 1, active_story = story, persist
//!     ▼
//! left side:  planning → requirements → design → coding
//! right side: unit_testing → integration_testing → system_testing → validation
//!     │  per stage: build input → agent (retries) → gate → record → persist
//!     ▼
//! SprintResult (per-stage outcomes + GO / NO-GO)
//! ```
//!
//! State is persisted after every stage, so a failure in one stage never
//! loses what earlier stages recorded. A hard gate failure or a failed stage
//! in `hard` mode stops the remaining stages on that side of the V only.

pub mod context;
pub mod sprint;


use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::agent::{AgentRegistry, AgentRequest, StageResult, StageStatus};
use crate::agent_runner;
use crate::checkpoint::{Checkpoint, CheckpointManager, CheckpointSummary};
use crate::config::Config;
use crate::error::{Result, VeriflowError};
use crate::gate::{self, GateFailure, GatingOutcome};
use crate::io;
use crate::paths::ProjectPaths;
use crate::state::{SprintState, StateStore};
use crate::types::{AgentRole, GatingMode, Side, Stage};

pub use context::StageContext;
pub use sprint::{Decision, OutcomeStatus, SprintResult, StageOutcome};

// ---------------------------------------------------------------------------
// StageError
// ---------------------------------------------------------------------------

/// Why `execute_stage` did not produce a passing result.
///
/// Everything except `Storage` is local to the stage and is recorded as a
/// failed stage by `run_sprint`. `Storage` means the state could not be
/// persisted and aborts the sprint.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{failure}")]
    Gate { failure: GateFailure, attempts: u32 },

    #[error("stage '{stage}' failed after {attempts} attempt(s): {message}")]
    Agent {
        stage: Stage,
        attempts: u32,
        message: String,
    },

    #[error("stage '{stage}' has invalid input: {message}")]
    Input { stage: Stage, message: String },

    #[error(transparent)]
    Storage(#[from] VeriflowError),
}

impl StageError {
    pub fn is_storage(&self) -> bool {
        matches!(self, StageError::Storage(_))
    }
}

/// A stage that ran (or was skipped) without error.
#[derive(Debug, Clone)]
struct StageRun {
    result: StageResult,
    gating: Option<GatingOutcome>,
    attempts: u32,
}

impl StageRun {
    fn skipped() -> Self {
        Self {
            result: StageResult::skipped(),
            gating: None,
            attempts: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    paths: ProjectPaths,
    config: Config,
    agents: AgentRegistry,
    store: StateStore,
    checkpoints: CheckpointManager,
    state: SprintState,
}

impl Orchestrator {
    /// Create the storage layout if needed and load (or bootstrap) state.
    pub fn new(paths: ProjectPaths, config: Config, agents: AgentRegistry) -> Result<Self> {
        paths.ensure()?;
        let store = StateStore::new(paths.state_file());
        let mut state = store.load();
        if !store.exists() {
            store.save(&mut state)?;
        }
        let checkpoints = CheckpointManager::new(paths.checkpoints_dir());
        Ok(Self {
            paths,
            config,
            agents,
            store,
            checkpoints,
            state,
        })
    }

    /// Load `config.yaml` and wire command agents from it.
    pub fn open(paths: ProjectPaths) -> Result<Self> {
        let config = Config::load(&paths)?;
        let agents = agent_runner::registry_from_config(&config, paths.root());
        Self::new(paths, config, agents)
    }

    pub fn state(&self) -> &SprintState {
        &self.state
    }

    pub fn current_stage(&self) -> Stage {
        self.state.current_stage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    fn persist(&mut self) -> Result<()> {
        self.store.save(&mut self.state)
    }

    // -----------------------------------------------------------------------
    // Single stage
    // -----------------------------------------------------------------------

    /// Run one stage against a caller-assembled context.
    ///
    /// A disabled stage returns a `skipped` result without calling an agent
    /// or touching state. A soft gate failure is logged and the stage is
    /// recorded as completed.
    pub async fn execute_stage(
        &mut self,
        stage: Stage,
        ctx: &StageContext,
    ) -> std::result::Result<StageResult, StageError> {
        self.run_stage(stage, ctx).await.map(|run| run.result)
    }

    async fn run_stage(
        &mut self,
        stage: Stage,
        ctx: &StageContext,
    ) -> std::result::Result<StageRun, StageError> {
        let stage_cfg = self.config.stage(stage);
        if !stage_cfg.enabled {
            tracing::info!(%stage, "stage disabled, skipping");
            return Ok(StageRun::skipped());
        }

        tracing::info!(%stage, sprint = self.state.sprint_number, "stage started");
        self.state.enter_stage(stage);

        let (result, attempts) = match stage.agent_role() {
            None => {
                let artifacts = context::plan_artifacts(ctx, &self.state, &self.config);
                (StageResult::success(artifacts), 0)
            }
            Some(role) => {
                let input = match context::build_input(stage, ctx, &self.state) {
                    Ok(input) => input,
                    Err(message) => {
                        self.persist()?;
                        return Err(StageError::Input { stage, message });
                    }
                };
                let request = AgentRequest {
                    stage,
                    role,
                    sprint_number: self.state.sprint_number,
                    input,
                    extra: context::extra(ctx),
                };
                match self.invoke(role, &request, stage_cfg.max_retries).await {
                    Ok(done) => done,
                    Err((attempts, message)) => {
                        self.persist()?;
                        tracing::warn!(%stage, attempts, %message, "stage failed");
                        return Err(StageError::Agent {
                            stage,
                            attempts,
                            message,
                        });
                    }
                }
            }
        };

        if result.status == StageStatus::Skipped {
            self.persist()?;
            tracing::info!(%stage, "agent skipped stage");
            return Ok(StageRun {
                result,
                gating: None,
                attempts,
            });
        }

        let outcome = gate::evaluate(stage, &result, stage_cfg.gating, &self.config.gating);
        if outcome.is_blocking() {
            self.persist()?;
            tracing::warn!(%stage, issues = ?outcome.issues, "hard gate failed");
            return Err(StageError::Gate {
                failure: GateFailure {
                    stage,
                    issues: outcome.issues,
                },
                attempts,
            });
        }
        if !outcome.passed {
            tracing::warn!(%stage, issues = ?outcome.issues, "soft gate failed, continuing");
        }

        let document = result.artifact_document();
        io::write_json(
            &self.paths.stage_artifact_file(self.state.sprint_number, stage),
            &document,
        )?;
        self.state.complete_stage(stage, document);
        self.persist()?;
        tracing::info!(%stage, attempts, "stage completed");

        Ok(StageRun {
            result,
            gating: Some(outcome),
            attempts,
        })
    }

    /// Call the role's agent until it succeeds or attempts run out.
    ///
    /// `Err` carries the attempt count and the last failure message.
    async fn invoke(
        &self,
        role: AgentRole,
        request: &AgentRequest,
        max_retries: u32,
    ) -> std::result::Result<(StageResult, u32), (u32, String)> {
        let Some(agent) = self.agents.get(role) else {
            return Err((0, format!("no agent registered for role '{role}'")));
        };

        let allowed = max_retries.saturating_add(1);
        let mut last_error = String::new();
        for attempt in 1..=allowed {
            match agent.process(request).await {
                Ok(result) if result.status != StageStatus::Error => return Ok((result, attempt)),
                Ok(result) => {
                    last_error = result
                        .error
                        .unwrap_or_else(|| "agent reported an error".to_string());
                }
                Err(e) => last_error = e.to_string(),
            }
            if attempt < allowed {
                tracing::warn!(
                    stage = %request.stage,
                    attempt,
                    error = %last_error,
                    "agent attempt failed, retrying"
                );
            }
        }
        Err((allowed, last_error))
    }

    // -----------------------------------------------------------------------
    // Sprint
    // -----------------------------------------------------------------------

    /// Run `story` through every stage of the V.
    ///
    /// Only a storage failure returns `Err`. Stage failures are reported in
    /// the result; `active_story` is cleared whatever happens.
    pub async fn run_sprint(&mut self, story: Value) -> Result<SprintResult> {
        let started_at = Utc::now();

        if self.config.checkpoints.auto {
            let name = format!("sprint-{}-start", self.state.sprint_number + 1);
            self.checkpoint(&name, "automatic checkpoint before sprint")?;
        }

        let sprint_number = self.state.begin_sprint(story.clone());
        self.persist()?;
        tracing::info!(sprint = sprint_number, "sprint started");

        let mut report = SprintResult::start(sprint_number, story.clone(), started_at);
        let run = self.run_sides(story, &mut report).await;

        self.state.end_sprint();
        let saved = self.persist();
        let validation = run?;
        saved?;

        report.finish(validation.as_ref());
        io::write_json(&self.paths.sprint_report_file(sprint_number), &report)?;
        tracing::info!(sprint = sprint_number, decision = %report.decision, "sprint finished");
        Ok(report)
    }

    /// Close a sprint whose `run_sprint` future was dropped mid-run.
    ///
    /// Clears `active_story` and persists. Stages that finished before the
    /// cancellation stay recorded. No-op when no sprint is active.
    pub fn abort_sprint(&mut self) -> Result<()> {
        if self.state.active_story.is_none() {
            return Ok(());
        }
        self.state.end_sprint();
        self.persist()?;
        tracing::warn!(sprint = self.state.sprint_number, "sprint aborted");
        Ok(())
    }

    /// Returns the validation stage's result when it produced one.
    async fn run_sides(
        &mut self,
        story: Value,
        report: &mut SprintResult,
    ) -> Result<Option<StageResult>> {
        let mut ctx: StageContext = Map::new();
        ctx.insert(context::STORY_KEY.to_string(), story);
        let mut validation = None;

        for side in [Side::Left, Side::Right] {
            for &stage in side.stages() {
                let started_at = Utc::now();
                let mode = self.config.gating_mode(stage);
                match self.run_stage(stage, &ctx).await {
                    Ok(run) => {
                        let status = match run.result.status {
                            StageStatus::Skipped => OutcomeStatus::Skipped,
                            _ => OutcomeStatus::Success,
                        };
                        let doc = match status {
                            OutcomeStatus::Success => run.result.artifact_document(),
                            _ => Value::Null,
                        };
                        ctx.insert(stage.as_str().to_string(), doc);
                        let warnings = run
                            .gating
                            .filter(|g| !g.passed)
                            .map(|g| g.issues)
                            .unwrap_or_default();
                        report.stages.insert(
                            stage,
                            StageOutcome {
                                status,
                                error: None,
                                warnings,
                                attempts: run.attempts,
                                started_at,
                                finished_at: Utc::now(),
                            },
                        );
                        if stage == Stage::Validation && status == OutcomeStatus::Success {
                            validation = Some(run.result);
                        }
                    }
                    Err(StageError::Storage(e)) => return Err(e),
                    Err(err) => {
                        let attempts = match &err {
                            StageError::Agent { attempts, .. }
                            | StageError::Gate { attempts, .. } => *attempts,
                            _ => 0,
                        };
                        ctx.insert(stage.as_str().to_string(), Value::Null);
                        report.stages.insert(
                            stage,
                            StageOutcome {
                                status: OutcomeStatus::Failed,
                                error: Some(err.to_string()),
                                warnings: Vec::new(),
                                attempts,
                                started_at,
                                finished_at: Utc::now(),
                            },
                        );
                        if mode == GatingMode::Hard {
                            tracing::warn!(
                                %stage,
                                %side,
                                "hard failure, halting the rest of this side"
                            );
                            report.halted.push(side);
                            break;
                        }
                    }
                }
            }
        }

        Ok(validation)
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Snapshot the live state under `name` and record it in the history.
    pub fn checkpoint(&mut self, name: &str, description: &str) -> Result<Checkpoint> {
        let checkpoint = self.checkpoints.create(name, description, &self.state)?;
        self.state.record_checkpoint(name, checkpoint.timestamp);
        self.persist()?;
        Ok(checkpoint)
    }

    /// Replace the live state with the named snapshot.
    ///
    /// Returns `Ok(false)` and leaves state untouched when no such
    /// checkpoint exists. History entries recorded after the checkpoint are
    /// dropped; the checkpoint's own entry is kept as the last one. Artifact
    /// files written after the checkpoint stay on disk but are no longer
    /// referenced by the state.
    pub fn restore_checkpoint(&mut self, name: &str) -> Result<bool> {
        if !self.checkpoints.exists(name) {
            return Ok(false);
        }
        let Some(state) = self.checkpoints.restore(name)? else {
            return Ok(false);
        };
        self.state = state;
        self.persist()?;
        tracing::info!(checkpoint = name, stage = %self.state.current_stage, "checkpoint restored");
        Ok(true)
    }

    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointSummary>> {
        self.checkpoints.list()
    }

    pub fn diff_checkpoints(&self, from: &str, to: &str) -> Result<String> {
        self.checkpoints.diff(from, to)
    }

    /// Delta from the named checkpoint to the live state.
    pub fn diff_with_live(&self, name: &str) -> Result<String> {
        let checkpoint = self
            .checkpoints
            .load(name)?
            .ok_or_else(|| VeriflowError::CheckpointNotFound(name.to_string()))?;
        Ok(crate::checkpoint::diff_states(
            &checkpoint.name,
            &checkpoint.state,
            "live",
            &self.state,
        ))
    }
}
