//! The agent boundary.
//!
//! Every role agent is a black box behind [`AgentPort`]: it receives an
//! [`AgentRequest`] carrying the typed input for one stage and answers with a
//! [`StageResult`]. The orchestrator only looks at `status`, `artifacts`,
//! `metrics` and whatever the gating policy inspects; everything else in the
//! result travels through untouched in `payload`.

use crate::error::Result;
use crate::types::{AgentRole, Stage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Error,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Success => "success",
            StageStatus::Error => "error",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// What an agent returns for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageStatus,
    #[serde(default)]
    pub artifacts: Map<String, Value>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Role-specific fields (`requirements_data`, `design_data`, `decision`, ...).
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl StageResult {
    pub fn success(artifacts: Map<String, Value>) -> Self {
        Self {
            status: StageStatus::Success,
            artifacts,
            metrics: Map::new(),
            error: None,
            payload: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Error,
            artifacts: Map::new(),
            metrics: Map::new(),
            error: Some(message.into()),
            payload: Map::new(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            artifacts: Map::new(),
            metrics: Map::new(),
            error: None,
            payload: Map::new(),
        }
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn with_payload(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    /// The document folded into `SprintState::stage_artifacts` for this stage.
    pub fn artifact_document(&self) -> Value {
        let mut doc = self.payload.clone();
        doc.insert("artifacts".to_string(), Value::Object(self.artifacts.clone()));
        if !self.metrics.is_empty() {
            doc.insert("metrics".to_string(), Value::Object(self.metrics.clone()));
        }
        Value::Object(doc)
    }
}

// ---------------------------------------------------------------------------
// StageInput
// ---------------------------------------------------------------------------

/// Typed input for each agent-backed stage.
///
/// Upstream documents are whatever the previous stage stored in its artifact
/// document; `Value::Null` means that stage has not produced anything yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageInput {
    Requirements {
        story: Value,
    },
    Design {
        story: Value,
        requirements: Value,
    },
    Coding {
        story: Value,
        requirements: Value,
        design: Value,
    },
    Testing {
        stage: Stage,
        story: Value,
        requirements: Value,
        design: Value,
        code: Value,
        /// Results of earlier testing stages in this sprint.
        previous_results: Map<String, Value>,
    },
    Validation {
        story: Value,
        stage_results: Map<String, Value>,
    },
}

/// Envelope sent to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub stage: Stage,
    pub role: AgentRole,
    pub sprint_number: u32,
    pub input: StageInput,
    /// Context keys the stage input does not model, forwarded as-is.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// AgentPort
// ---------------------------------------------------------------------------

/// A role agent. `Err` and `status: error` are both treated as a failed
/// attempt by the orchestrator.
#[async_trait]
pub trait AgentPort: Send + Sync {
    async fn process(&self, request: &AgentRequest) -> Result<StageResult>;
}

// ---------------------------------------------------------------------------
// AgentRegistry
// ---------------------------------------------------------------------------

/// Role → agent table, built once and handed to the orchestrator.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentRole, Arc<dyn AgentPort>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: AgentRole, agent: Arc<dyn AgentPort>) -> Self {
        self.agents.insert(role, agent);
        self
    }

    pub fn insert(&mut self, role: AgentRole, agent: Arc<dyn AgentPort>) {
        self.agents.insert(role, agent);
    }

    pub fn get(&self, role: AgentRole) -> Option<Arc<dyn AgentPort>> {
        self.agents.get(&role).cloned()
    }

    pub fn for_stage(&self, stage: Stage) -> Option<Arc<dyn AgentPort>> {
        stage.agent_role().and_then(|role| self.get(role))
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = self.agents.keys().copied().collect();
        roles.sort();
        roles
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("roles", &self.roles())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
