use crate::agent::StageResult;
use crate::config::GatingConfig;
use crate::types::{GatingMode, Stage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// GatingOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingOutcome {
    pub passed: bool,
    pub mode: GatingMode,
    pub issues: Vec<String>,
}

impl GatingOutcome {
    /// A failed outcome that must stop the sprint side.
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.mode == GatingMode::Hard
    }
}

// ---------------------------------------------------------------------------
// GateFailure
// ---------------------------------------------------------------------------

/// A hard gate rejected a stage result.
#[derive(Debug, Clone, PartialEq)]
pub struct GateFailure {
    pub stage: Stage,
    pub issues: Vec<String>,
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hard gate failed for stage '{}': {}",
            self.stage,
            self.issues.join("; ")
        )
    }
}

impl std::error::Error for GateFailure {}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Judge a successful stage result against the stage's acceptance criteria.
///
/// Pure: no I/O, no clock. Stages without a predicate always pass.
pub fn evaluate(
    stage: Stage,
    result: &StageResult,
    mode: GatingMode,
    thresholds: &GatingConfig,
) -> GatingOutcome {
    if mode == GatingMode::Off {
        return GatingOutcome {
            passed: true,
            mode,
            issues: Vec::new(),
        };
    }

    let mut issues = Vec::new();
    match stage {
        Stage::Requirements => check_acceptance_criteria(result, &mut issues),
        Stage::UnitTesting => {
            check_coverage(result, thresholds.coverage_threshold, &mut issues);
            check_failed_tests(result, &mut issues);
        }
        Stage::IntegrationTesting | Stage::SystemTesting => {
            check_failed_tests(result, &mut issues);
        }
        _ => {}
    }

    GatingOutcome {
        passed: issues.is_empty(),
        mode,
        issues,
    }
}

fn check_acceptance_criteria(result: &StageResult, issues: &mut Vec<String>) {
    let criteria = result
        .payload
        .get("requirements_data")
        .and_then(|data| data.get("acceptance_criteria"))
        .or_else(|| result.artifacts.get("acceptance_criteria"));

    let present = match criteria {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(text)) => !text.trim().is_empty(),
        _ => false,
    };
    if !present {
        issues.push("requirements have no acceptance criteria".to_string());
    }
}

fn check_coverage(result: &StageResult, threshold: f64, issues: &mut Vec<String>) {
    match result.metrics.get("coverage").and_then(number) {
        Some(coverage) if coverage >= threshold => {}
        Some(coverage) => issues.push(format!(
            "test coverage {coverage:.1}% is below the {threshold:.1}% threshold"
        )),
        None => issues.push("no test coverage metric reported".to_string()),
    }
}

fn check_failed_tests(result: &StageResult, issues: &mut Vec<String>) {
    if let Some(failed) = result.metrics.get("tests_failed").and_then(number) {
        if failed > 0.0 {
            issues.push(format!("{failed} tests failed"));
        }
    }
}

/// Accept numbers and numeric strings ("85", "85%").
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn thresholds() -> GatingConfig {
        GatingConfig::default()
    }

    fn requirements_result(criteria: Value) -> StageResult {
        StageResult::success(Map::new())
            .with_payload("requirements_data", json!({ "acceptance_criteria": criteria }))
    }

    #[test]
    fn off_mode_always_passes() {
        let outcome = evaluate(
            Stage::Requirements,
            &StageResult::success(Map::new()),
            GatingMode::Off,
            &thresholds(),
        );
        assert!(outcome.passed);
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn requirements_need_acceptance_criteria() {
        let ok = evaluate(
            Stage::Requirements,
            &requirements_result(json!(["user can log in"])),
            GatingMode::Hard,
            &thresholds(),
        );
        assert!(ok.passed);

        let empty = evaluate(
            Stage::Requirements,
            &requirements_result(json!([])),
            GatingMode::Hard,
            &thresholds(),
        );
        assert!(!empty.passed);
        assert!(empty.is_blocking());
        assert!(empty.issues[0].contains("acceptance criteria"));

        let missing = evaluate(
            Stage::Requirements,
            &StageResult::success(Map::new()),
            GatingMode::Soft,
            &thresholds(),
        );
        assert!(!missing.passed);
        assert!(!missing.is_blocking());
    }

    #[test]
    fn acceptance_criteria_from_artifacts() {
        let mut artifacts = Map::new();
        artifacts.insert("acceptance_criteria".into(), json!("- it works"));
        let outcome = evaluate(
            Stage::Requirements,
            &StageResult::success(artifacts),
            GatingMode::Hard,
            &thresholds(),
        );
        assert!(outcome.passed);
    }

    #[test]
    fn unit_testing_coverage_threshold() {
        let at = StageResult::success(Map::new()).with_metric("coverage", 80);
        assert!(evaluate(Stage::UnitTesting, &at, GatingMode::Hard, &thresholds()).passed);

        let below = StageResult::success(Map::new()).with_metric("coverage", 79.5);
        let outcome = evaluate(Stage::UnitTesting, &below, GatingMode::Hard, &thresholds());
        assert!(!outcome.passed);
        assert!(outcome.issues[0].contains("below"));

        let text = StageResult::success(Map::new()).with_metric("coverage", "91%");
        assert!(evaluate(Stage::UnitTesting, &text, GatingMode::Hard, &thresholds()).passed);

        let none = StageResult::success(Map::new());
        let outcome = evaluate(Stage::UnitTesting, &none, GatingMode::Soft, &thresholds());
        assert_eq!(outcome.issues, vec!["no test coverage metric reported"]);
    }

    #[test]
    fn custom_coverage_threshold() {
        let custom = GatingConfig {
            coverage_threshold: 95.0,
        };
        let result = StageResult::success(Map::new()).with_metric("coverage", 90);
        assert!(!evaluate(Stage::UnitTesting, &result, GatingMode::Hard, &custom).passed);
    }

    #[test]
    fn failed_tests_flagged_on_testing_stages() {
        let result = StageResult::success(Map::new()).with_metric("tests_failed", 2);
        let outcome = evaluate(
            Stage::IntegrationTesting,
            &result,
            GatingMode::Hard,
            &thresholds(),
        );
        assert!(!outcome.passed);

        let clean = StageResult::success(Map::new()).with_metric("tests_failed", 0);
        assert!(evaluate(Stage::SystemTesting, &clean, GatingMode::Hard, &thresholds()).passed);
    }

    #[test]
    fn stages_without_predicates_pass() {
        for stage in [Stage::Planning, Stage::Design, Stage::Coding, Stage::Validation] {
            let outcome = evaluate(
                stage,
                &StageResult::success(Map::new()),
                GatingMode::Hard,
                &thresholds(),
            );
            assert!(outcome.passed, "{stage}");
        }
    }

    #[test]
    fn gate_failure_display() {
        let failure = GateFailure {
            stage: Stage::Requirements,
            issues: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            failure.to_string(),
            "hard gate failed for stage 'requirements': a; b"
        );
    }
}
