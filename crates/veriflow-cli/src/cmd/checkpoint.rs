use crate::cmd::open;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::{Args, Subcommand};
use std::path::Path;

/// `veriflow checkpoint --name <n>` creates; the subcommands manage the rest.
#[derive(Args)]
pub struct CheckpointArgs {
    #[command(subcommand)]
    pub subcommand: Option<CheckpointSubcommand>,

    /// Name of the checkpoint to create
    #[arg(long)]
    pub name: Option<String>,

    /// Free-form note stored with the checkpoint
    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Subcommand)]
pub enum CheckpointSubcommand {
    /// Snapshot the current state under a name
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List checkpoints, newest first
    List,

    /// Replace the current state with a checkpoint
    Restore { name: String },

    /// Show what changed between two checkpoints ("live" for the current state)
    Diff { from: String, to: String },
}

const LIVE: &str = "live";

pub fn run(root: &Path, args: CheckpointArgs, json: bool) -> anyhow::Result<()> {
    match (args.subcommand, args.name) {
        (Some(CheckpointSubcommand::Create { name, description }), _) => {
            create(root, &name, &description, json)
        }
        (Some(CheckpointSubcommand::List), _) => list(root, json),
        (Some(CheckpointSubcommand::Restore { name }), _) => restore(root, &name, json),
        (Some(CheckpointSubcommand::Diff { from, to }), _) => diff(root, &from, &to, json),
        (None, Some(name)) => create(root, &name, &args.description, json),
        (None, None) => anyhow::bail!(
            "checkpoint needs --name <NAME> or a subcommand (create, list, restore, diff)"
        ),
    }
}

fn create(root: &Path, name: &str, description: &str, json: bool) -> anyhow::Result<()> {
    let mut orch = open(root)?;
    let checkpoint = orch
        .checkpoint(name, description)
        .with_context(|| format!("failed to create checkpoint '{name}'"))?;

    if json {
        print_json(&serde_json::json!({
            "name": checkpoint.name,
            "stage": checkpoint.stage,
            "timestamp": checkpoint.timestamp,
        }))?;
    } else {
        println!(
            "Checkpoint '{}' created at stage {}",
            checkpoint.name, checkpoint.stage
        );
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let orch = open(root)?;
    let checkpoints = orch.list_checkpoints().context("failed to list checkpoints")?;

    if json {
        return print_json(&checkpoints);
    }
    if checkpoints.is_empty() {
        println!("No checkpoints.");
        return Ok(());
    }

    let rows = checkpoints
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.stage.to_string(),
                c.sprint_number.to_string(),
                c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                c.description.clone(),
            ]
        })
        .collect();
    print_table(&["NAME", "STAGE", "SPRINT", "CREATED", "DESCRIPTION"], rows);
    Ok(())
}

fn restore(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let mut orch = open(root)?;
    let restored = orch
        .restore_checkpoint(name)
        .with_context(|| format!("failed to restore checkpoint '{name}'"))?;
    if !restored {
        anyhow::bail!("checkpoint not found: {name}");
    }

    if json {
        print_json(orch.state())?;
    } else {
        println!(
            "Restored '{}': stage {}, sprint {}",
            name,
            orch.current_stage(),
            orch.state().sprint_number
        );
    }
    Ok(())
}

fn diff(root: &Path, from: &str, to: &str, json: bool) -> anyhow::Result<()> {
    let orch = open(root)?;
    let text = match (from, to) {
        (_, LIVE) => orch.diff_with_live(from)?,
        (LIVE, _) => anyhow::bail!("'live' can only be the second argument"),
        _ => orch.diff_checkpoints(from, to)?,
    };

    if json {
        let lines: Vec<&str> = text.lines().collect();
        print_json(&serde_json::json!({ "from": from, "to": to, "lines": lines }))?;
    } else {
        println!("{text}");
    }
    Ok(())
}
