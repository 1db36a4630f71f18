use thiserror::Error;

#[derive(Debug, Error)]
pub enum VeriflowError {
    #[error("not initialized: run 'veriflow init'")]
    NotInitialized,

    #[error("invalid stage: {0}")]
    InvalidStage(String),

    #[error("invalid gating mode '{0}': expected hard, soft, or off")]
    InvalidGatingMode(String),

    #[error("invalid checkpoint name '{0}': use letters, digits, '-', '_' or '.'")]
    InvalidCheckpointName(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("invalid workflow id '{0}': use letters, digits, '-' or '_'")]
    InvalidWorkflowId(String),

    #[error("agent '{role}' failed: {message}")]
    Agent { role: String, message: String },

    #[error("agent '{role}' is not configured: {reason}")]
    AgentNotConfigured { role: String, reason: String },

    #[error("agent '{role}' could not be started: {message}")]
    AgentSpawnFailed { role: String, message: String },

    #[error("agent '{role}' timed out after {seconds}s")]
    AgentTimeout { role: String, seconds: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VeriflowError>;
