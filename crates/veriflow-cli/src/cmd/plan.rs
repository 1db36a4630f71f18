use crate::cmd::{open, runtime, story_from_text};
use crate::output::{print_json, print_table};
use anyhow::Context;
use serde_json::Map;
use std::path::Path;
use veriflow_core::orchestrator::context::STORY_KEY;
use veriflow_core::types::Stage;

pub fn run(root: &Path, feature: &str, json: bool) -> anyhow::Result<()> {
    let mut orch = open(root)?;
    let story = story_from_text(feature);

    let mut ctx = Map::new();
    ctx.insert(STORY_KEY.to_string(), story);

    let rt = runtime()?;
    let result = rt
        .block_on(orch.execute_stage(Stage::Planning, &ctx))
        .context("planning failed")?;

    if json {
        return print_json(&result.artifacts);
    }

    let config = orch.config();
    let rows = Stage::all()
        .iter()
        .map(|&stage| {
            let cfg = config.stage(stage);
            let agent = match stage.agent_role() {
                Some(role) if config.agent(role).command.is_empty() => {
                    format!("{role} (no command)")
                }
                Some(role) => role.to_string(),
                None => "-".to_string(),
            };
            vec![
                stage.to_string(),
                stage.side().to_string(),
                if cfg.enabled { "yes" } else { "no" }.to_string(),
                cfg.gating.to_string(),
                cfg.max_retries.to_string(),
                agent,
            ]
        })
        .collect();

    println!("Sprint plan (next sprint: {})", orch.state().sprint_number + 1);
    print_table(
        &["STAGE", "SIDE", "ENABLED", "GATING", "RETRIES", "AGENT"],
        rows,
    );
    Ok(())
}
