use crate::output::print_json;
use anyhow::Context;
use serde::Serialize;
use std::path::Path;
use veriflow_core::config::Config;
use veriflow_core::paths::{self, ProjectPaths};
use veriflow_core::state::StateStore;

#[derive(Serialize)]
struct InitReport {
    root: String,
    config: &'static str,
    state: &'static str,
}

pub fn run(root: &Path, template: Option<&Path>, force: bool, json: bool) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let paths = ProjectPaths::new(root);
    paths
        .ensure()
        .with_context(|| format!("failed to create {}", paths.veriflow_dir().display()))?;

    let existed = paths.is_initialized();
    let config = if existed && !force {
        "exists"
    } else {
        let seed = match template {
            Some(file) => Config::load_file(file)
                .with_context(|| format!("failed to read config template {}", file.display()))?,
            None => Config::new(&project_name),
        };
        seed.save(&paths).context("failed to write config.yaml")?;
        if existed {
            "overwritten"
        } else {
            "created"
        }
    };

    let store = StateStore::new(paths.state_file());
    let state = if store.exists() {
        "exists"
    } else {
        let mut fresh = store.load();
        store.save(&mut fresh).context("failed to write state.json")?;
        "created"
    };

    if json {
        return print_json(&InitReport {
            root: root.display().to_string(),
            config,
            state,
        });
    }

    println!("Initializing veriflow in: {}", root.display());
    println!("  {:<8} {}/{}", format!("{config}:"), paths::VERIFLOW_DIR, paths::CONFIG_FILE);
    println!("  {:<8} {}/{}", format!("{state}:"), paths::VERIFLOW_DIR, paths::STATE_FILE);
    println!(
        "\nNext: add agent commands to {}/{}, then run 'veriflow validate'.",
        paths::VERIFLOW_DIR,
        paths::CONFIG_FILE
    );
    Ok(())
}
