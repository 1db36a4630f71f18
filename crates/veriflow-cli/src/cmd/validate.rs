use crate::output::{print_json, print_warning};
use anyhow::Context;
use std::path::Path;
use veriflow_core::config::{Config, WarnLevel};
use veriflow_core::paths::ProjectPaths;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(&ProjectPaths::new(root)).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "valid": !warnings.iter().any(|w| w.level == WarnLevel::Error),
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            match w.level {
                WarnLevel::Warning => print_warning(&w.message),
                WarnLevel::Error => eprintln!("[error] {}", w.message),
            }
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
