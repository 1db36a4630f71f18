use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use veriflow_core::config::Config;
use veriflow_core::paths::ProjectPaths;
use veriflow_core::state::StateStore;
use veriflow_core::types::Stage;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let paths = ProjectPaths::new(root);
    let config = Config::load(&paths).context("failed to load config")?;
    let state = StateStore::new(paths.state_file()).load();

    if json {
        return print_json(&state);
    }

    println!("Project:       {}", config.project.name);
    println!("Sprint:        {}", state.sprint_number);
    println!("Current stage: {}", state.current_stage);

    match &state.active_story {
        Some(story) => println!("Active story:  {story}"),
        None => println!("Active story:  none"),
    }

    if state.completed_stages.is_empty() {
        println!("Completed:     none");
    } else {
        let names: Vec<&str> = state.completed_stages.iter().map(|s| s.as_str()).collect();
        println!("Completed:     {}", names.join(", "));
    }

    let pending: Vec<&str> = Stage::all()
        .iter()
        .filter(|s| config.is_enabled(**s) && !state.is_completed(**s))
        .map(|s| s.as_str())
        .collect();
    if !pending.is_empty() {
        println!("Not yet run:   {}", pending.join(", "));
    }

    if let Some(cp) = state.last_checkpoint() {
        println!(
            "Checkpoint:    {} ({})",
            cp.name,
            cp.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!(
        "Updated:       {}",
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
