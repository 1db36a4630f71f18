//! Subprocess-backed agents.
//!
//! A command agent speaks a JSON stdin/stdout protocol: it reads one
//! [`AgentRequest`] from stdin and writes one [`StageResult`] to stdout.
//! Stderr is inherited so agent log lines show up in the terminal.
//!
//! A non-zero exit code is not fatal on its own. If stdout still parses as a
//! `StageResult` it is returned as-is; otherwise the exit is reported as an
//! agent failure with the first part of stdout as a hint.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::agent::{AgentPort, AgentRegistry, AgentRequest, StageResult};
use crate::config::{AgentSettings, Config};
use crate::error::{Result, VeriflowError};
use crate::types::AgentRole;

// ---------------------------------------------------------------------------
// CommandAgent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommandAgent {
    role: AgentRole,
    program: String,
    args: Vec<String>,
    settings: AgentSettings,
    cwd: PathBuf,
}

impl CommandAgent {
    /// Returns `None` when the settings carry no command.
    pub fn from_settings(role: AgentRole, settings: AgentSettings, cwd: &Path) -> Option<Self> {
        let (program, args) = settings.command.split_first()?;
        Some(Self {
            role,
            program: program.clone(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            settings,
        })
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.current_dir(&self.cwd);
        cmd.env("VERIFLOW_ROOT", &self.cwd);
        cmd.env("VERIFLOW_AGENT_ROLE", self.role.as_str());
        cmd.env("VERIFLOW_MODEL", &self.settings.model);
        cmd.env("VERIFLOW_MAX_TOKENS", self.settings.max_tokens.to_string());
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, request: &AgentRequest) -> Result<StageResult> {
        let role = self.role.as_str().to_string();
        let payload = serde_json::to_vec(request)?;

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| VeriflowError::AgentSpawnFailed {
                role: role.clone(),
                message: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| VeriflowError::AgentSpawnFailed {
                    role: role.clone(),
                    message: format!("failed to write stdin: {e}"),
                })?;
            // Dropping stdin closes the pipe so the agent sees EOF.
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match serde_json::from_str::<StageResult>(stdout.trim()) {
            Ok(result) => Ok(result),
            Err(parse_err) => {
                let hint: String = stdout.chars().take(500).collect();
                let message = if output.status.success() {
                    format!("invalid output ({parse_err}): {hint}")
                } else {
                    format!("exited with {}: {hint}", output.status)
                };
                Err(VeriflowError::Agent { role, message })
            }
        }
    }
}

#[async_trait]
impl AgentPort for CommandAgent {
    async fn process(&self, request: &AgentRequest) -> Result<StageResult> {
        let seconds = self.settings.timeout_seconds;
        tracing::debug!(
            role = %self.role,
            program = %self.program,
            stage = %request.stage,
            "spawning agent"
        );
        match tokio::time::timeout(Duration::from_secs(seconds), self.run(request)).await {
            Ok(result) => result,
            Err(_) => Err(VeriflowError::AgentTimeout {
                role: self.role.as_str().to_string(),
                seconds,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// UnconfiguredAgent
// ---------------------------------------------------------------------------

/// Stands in for a role with no command so the failure surfaces per stage
/// instead of at startup.
#[derive(Debug, Clone)]
pub struct UnconfiguredAgent {
    role: AgentRole,
}

impl UnconfiguredAgent {
    pub fn new(role: AgentRole) -> Self {
        Self { role }
    }
}

#[async_trait]
impl AgentPort for UnconfiguredAgent {
    async fn process(&self, _request: &AgentRequest) -> Result<StageResult> {
        Err(VeriflowError::AgentNotConfigured {
            role: self.role.as_str().to_string(),
            reason: format!("set agents.{}.command in config.yaml", self.role),
        })
    }
}

// ---------------------------------------------------------------------------
// Registry construction
// ---------------------------------------------------------------------------

/// Build the role table from `config.agents`, running agents in `cwd`.
pub fn registry_from_config(config: &Config, cwd: &Path) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for role in AgentRole::all() {
        let agent: Arc<dyn AgentPort> =
            match CommandAgent::from_settings(*role, config.agent(*role), cwd) {
                Some(cmd) => Arc::new(cmd),
                None => Arc::new(UnconfiguredAgent::new(*role)),
            };
        registry.insert(*role, agent);
    }
    registry
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
