//! Turning a free-form stage context into typed agent input.
//!
//! The context map is whatever the caller assembled: usually `story` plus
//! one entry per earlier stage keyed by stage name. A stage key that is
//! present (even as `null`) wins; a missing key falls back to the artifacts
//! recorded in `SprintState`.

use crate::agent::StageInput;
use crate::config::Config;
use crate::state::SprintState;
use crate::types::Stage;
use serde_json::{json, Map, Value};

pub type StageContext = Map<String, Value>;

pub const STORY_KEY: &str = "story";

/// The story for this stage: the context's, else the sprint's active story.
pub fn story(ctx: &StageContext, state: &SprintState) -> Value {
    ctx.get(STORY_KEY)
        .cloned()
        .or_else(|| state.active_story.clone())
        .unwrap_or(Value::Null)
}

fn upstream(ctx: &StageContext, state: &SprintState, stage: Stage) -> Value {
    ctx.get(stage.as_str())
        .cloned()
        .or_else(|| state.artifacts_for(stage).cloned())
        .unwrap_or(Value::Null)
}

/// Upstream documents for every stage before `stage` that has one.
fn results_before(
    ctx: &StageContext,
    state: &SprintState,
    stage: Stage,
    filter: impl Fn(Stage) -> bool,
) -> Map<String, Value> {
    Stage::all()
        .iter()
        .copied()
        .filter(|s| *s < stage && filter(*s))
        .filter_map(|s| {
            let doc = upstream(ctx, state, s);
            (!doc.is_null()).then(|| (s.as_str().to_string(), doc))
        })
        .collect()
}

/// Context entries that are neither the story nor a stage document.
pub fn extra(ctx: &StageContext) -> Map<String, Value> {
    ctx.iter()
        .filter(|(k, _)| k.as_str() != STORY_KEY && !Stage::is_valid(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Build the typed input for an agent-backed stage.
///
/// Returns `Err` with a reason when the context cannot satisfy the stage.
pub fn build_input(
    stage: Stage,
    ctx: &StageContext,
    state: &SprintState,
) -> Result<StageInput, String> {
    let story = story(ctx, state);
    let input = match stage {
        Stage::Planning => return Err("planning has no agent input".to_string()),
        Stage::Requirements => {
            if story.is_null() {
                return Err("a story is required to derive requirements".to_string());
            }
            StageInput::Requirements { story }
        }
        Stage::Design => StageInput::Design {
            story,
            requirements: upstream(ctx, state, Stage::Requirements),
        },
        Stage::Coding => StageInput::Coding {
            story,
            requirements: upstream(ctx, state, Stage::Requirements),
            design: upstream(ctx, state, Stage::Design),
        },
        Stage::UnitTesting | Stage::IntegrationTesting | Stage::SystemTesting => {
            StageInput::Testing {
                stage,
                story,
                requirements: upstream(ctx, state, Stage::Requirements),
                design: upstream(ctx, state, Stage::Design),
                code: upstream(ctx, state, Stage::Coding),
                previous_results: results_before(ctx, state, stage, Stage::is_testing),
            }
        }
        Stage::Validation => StageInput::Validation {
            story,
            stage_results: results_before(ctx, state, stage, |_| true),
        },
    };
    Ok(input)
}

/// Artifacts of the planning stage, which runs without an agent.
pub fn plan_artifacts(
    ctx: &StageContext,
    state: &SprintState,
    config: &Config,
) -> Map<String, Value> {
    let stages: Vec<&str> = Stage::all()
        .iter()
        .filter(|s| config.is_enabled(**s))
        .map(|s| s.as_str())
        .collect();
    let mut artifacts = Map::new();
    artifacts.insert(
        "plan".to_string(),
        json!({
            "story": story(ctx, state),
            "sprint_number": state.sprint_number,
            "stages": stages,
        }),
    );
    artifacts
}
