pub mod checkpoint;
pub mod init;
pub mod plan;
pub mod sprint;
pub mod status;
pub mod validate;

use anyhow::Context;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use veriflow_core::orchestrator::Orchestrator;
use veriflow_core::paths::ProjectPaths;

/// The user pressed Ctrl-C while a command was running.
#[derive(Debug)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interrupted")
    }
}

impl std::error::Error for Interrupted {}

/// Open the orchestrator for an initialized project, wiring agents from
/// `config.yaml`.
pub fn open(root: &Path) -> anyhow::Result<Orchestrator> {
    let paths = ProjectPaths::new(root);
    Orchestrator::open(paths).context("failed to open project")
}

/// A JSON object is taken as-is; anything else becomes `{"title": text}`.
pub fn story_from_text(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({ "title": text.trim() }),
    }
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
