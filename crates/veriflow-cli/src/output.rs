use console::style;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "anthropic_api_key",
    "subscription",
    "unauthorized",
    "authentication",
    "invalid x-api-key",
];

/// Message shown to the user for a failed command.
///
/// Credential and billing failures from agents collapse into one generic
/// line. Otherwise the outermost context and the root cause are shown; with
/// `debug` the whole anyhow chain is kept.
pub fn user_facing_error(err: &anyhow::Error, debug: bool) -> String {
    let full = format!("{err:#}");
    let lower = full.to_lowercase();
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        return "agent backend rejected the request: check the agent configuration".to_string();
    }
    if debug || err.chain().count() <= 2 {
        return full;
    }
    format!("{err}: {}", err.root_cause())
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", style("error:").red().bold(), style(message).red());
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("warning:").yellow().bold(), message);
}
