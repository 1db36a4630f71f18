use crate::agent::StageResult;
use crate::types::{Side, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StageOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

/// How one stage went inside a sprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Soft gate issues. The stage still counted as passed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "NO-GO")]
    NoGo,
}

impl Decision {
    /// Read an integration agent's verdict. Anything but a clear GO is NO-GO.
    pub fn from_verdict(verdict: &str) -> Self {
        let normalized = verdict.trim().to_ascii_uppercase().replace('_', "-");
        match normalized.as_str() {
            "GO" | "PASS" | "APPROVED" => Decision::Go,
            _ => Decision::NoGo,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Go => f.write_str("GO"),
            Decision::NoGo => f.write_str("NO-GO"),
        }
    }
}

// ---------------------------------------------------------------------------
// SprintResult
// ---------------------------------------------------------------------------

/// Aggregated report of one `run_sprint` call. Stages that were never
/// attempted have no entry in `stages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintResult {
    pub run_id: Uuid,
    pub sprint_number: u32,
    pub story: Value,
    pub stages: BTreeMap<Stage, StageOutcome>,
    /// Sides cut short by a hard failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub halted: Vec<Side>,
    pub decision: Decision,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SprintResult {
    pub(crate) fn start(sprint_number: u32, story: Value, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            sprint_number,
            story,
            stages: BTreeMap::new(),
            halted: Vec::new(),
            decision: Decision::NoGo,
            started_at,
            finished_at: started_at,
        }
    }

    pub(crate) fn finish(&mut self, validation: Option<&StageResult>) {
        self.decision = decide(&self.stages, validation);
        self.finished_at = Utc::now();
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.get(&stage)
    }

    pub fn failed_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|(_, o)| o.status == OutcomeStatus::Failed)
            .map(|(s, _)| *s)
            .collect()
    }

    /// Stages in the order they were attempted.
    pub fn attempted(&self) -> Vec<Stage> {
        self.stages.keys().copied().collect()
    }

    pub fn is_go(&self) -> bool {
        self.decision == Decision::Go
    }
}

/// Any failed stage means NO-GO. Otherwise the integration agent's
/// `decision` field decides, and a sprint without one is GO.
pub fn decide(
    stages: &BTreeMap<Stage, StageOutcome>,
    validation: Option<&StageResult>,
) -> Decision {
    if stages.values().any(|o| o.status == OutcomeStatus::Failed) {
        return Decision::NoGo;
    }
    match validation
        .and_then(|r| r.payload.get("decision"))
        .and_then(Value::as_str)
    {
        Some(verdict) => Decision::from_verdict(verdict),
        None => Decision::Go,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn outcome(status: OutcomeStatus) -> StageOutcome {
        let now = Utc::now();
        StageOutcome {
            status,
            error: None,
            warnings: Vec::new(),
            attempts: 1,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn verdict_parsing() {
        assert_eq!(Decision::from_verdict("GO"), Decision::Go);
        assert_eq!(Decision::from_verdict(" go "), Decision::Go);
        assert_eq!(Decision::from_verdict("NO_GO"), Decision::NoGo);
        assert_eq!(Decision::from_verdict("CONDITIONAL"), Decision::NoGo);
    }

    #[test]
    fn failures_force_no_go() {
        let mut stages = BTreeMap::new();
        stages.insert(Stage::Planning, outcome(OutcomeStatus::Success));
        stages.insert(Stage::Requirements, outcome(OutcomeStatus::Failed));
        let verdict = StageResult::success(Map::new()).with_payload("decision", "GO");
        assert_eq!(decide(&stages, Some(&verdict)), Decision::NoGo);
    }

    #[test]
    fn integration_verdict_decides_clean_sprint() {
        let mut stages = BTreeMap::new();
        stages.insert(Stage::Validation, outcome(OutcomeStatus::Success));
        let no_go = StageResult::success(Map::new()).with_payload("decision", "NO-GO");
        assert_eq!(decide(&stages, Some(&no_go)), Decision::NoGo);
        assert_eq!(decide(&stages, None), Decision::Go);
        stages.insert(Stage::Coding, outcome(OutcomeStatus::Skipped));
        assert_eq!(decide(&stages, None), Decision::Go);
    }

    #[test]
    fn result_serializes_stage_keys_and_decision() {
        let mut result = SprintResult::start(3, json!({"id": "US-001"}), Utc::now());
        result
            .stages
            .insert(Stage::Requirements, outcome(OutcomeStatus::Failed));
        result.finish(None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["decision"], "NO-GO");
        assert_eq!(json["stages"]["requirements"]["status"], "failed");
        assert!(json.get("halted").is_none());
        assert_eq!(result.failed_stages(), vec![Stage::Requirements]);
    }
}
