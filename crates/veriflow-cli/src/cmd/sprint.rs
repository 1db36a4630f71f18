use crate::cmd::{open, runtime, story_from_text, Interrupted};
use crate::output::{print_json, print_table};
use anyhow::Context;
use console::style;
use std::path::Path;
use veriflow_core::orchestrator::{OutcomeStatus, SprintResult};
use veriflow_core::types::Stage;

pub fn run(root: &Path, story: &str, json: bool) -> anyhow::Result<()> {
    let mut orch = open(root)?;
    let story = story_from_text(story);

    let rt = runtime()?;
    let finished = rt.block_on(async {
        tokio::select! {
            result = orch.run_sprint(story) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    });
    let Some(result) = finished else {
        // The sprint future is dropped by now; close the sprint on disk.
        orch.abort_sprint().context("failed to record the interrupted sprint")?;
        return Err(anyhow::Error::new(Interrupted));
    };
    let report = result.context("sprint aborted")?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.is_go() {
        anyhow::bail!("sprint {} finished with {}", report.sprint_number, report.decision);
    }
    Ok(())
}

fn print_report(report: &SprintResult) {
    println!("Sprint {} ({})", report.sprint_number, report.run_id);

    let rows = Stage::all()
        .iter()
        .map(|stage| match report.outcome(*stage) {
            Some(outcome) => {
                let note = match (&outcome.error, outcome.warnings.is_empty()) {
                    (Some(err), _) => err.clone(),
                    (None, false) => format!("warning: {}", outcome.warnings.join("; ")),
                    (None, true) => String::new(),
                };
                let status = match outcome.status {
                    OutcomeStatus::Success => "success",
                    OutcomeStatus::Failed => "failed",
                    OutcomeStatus::Skipped => "skipped",
                };
                vec![
                    stage.to_string(),
                    status.to_string(),
                    outcome.attempts.to_string(),
                    note,
                ]
            }
            None => vec![
                stage.to_string(),
                "not run".to_string(),
                "0".to_string(),
                String::new(),
            ],
        })
        .collect();
    print_table(&["STAGE", "STATUS", "ATTEMPTS", "NOTE"], rows);

    for side in &report.halted {
        println!("{} side halted by a hard failure", side);
    }

    let decision = if report.is_go() {
        style(report.decision.to_string()).green().bold()
    } else {
        style(report.decision.to_string()).red().bold()
    };
    println!("\nDecision: {decision}");
}
