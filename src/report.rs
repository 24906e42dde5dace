//! Final results rendering: aligned text table or JSON.

use anyhow::{Context, Result};

use crate::play::TaskResult;

const HEADERS: [&str; 7] = ["NAME", "START", "END", "DURATION", "STATUS", "COMMAND", "LOGS"];

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "failed" }
}

/// Render results as a column-aligned text table, one row per task, in
/// task creation order. Returns the table with a trailing newline.
pub fn render_table(results: &[TaskResult]) -> String {
    let name_width = results
        .iter()
        .map(|r| r.name.len())
        .chain([HEADERS[0].len()])
        .max()
        .unwrap_or(0);
    let command_width = results
        .iter()
        .map(|r| r.command.len())
        .chain([HEADERS[5].len()])
        .max()
        .unwrap_or(0);

    let mut out = format!(
        "{:name_width$}  {:8}  {:8}  {:>9}  {:7}  {:command_width$}  {}\n",
        HEADERS[0], HEADERS[1], HEADERS[2], HEADERS[3], HEADERS[4], HEADERS[5], HEADERS[6],
    );
    for result in results {
        let duration = format!("{:.3}s", result.duration_ms as f64 / 1000.0);
        out.push_str(&format!(
            "{:name_width$}  {:8}  {:8}  {:>9}  {:7}  {:command_width$}  {}\n",
            result.name,
            result.started_at,
            result.ended_at,
            duration,
            status_label(result.success),
            result.command,
            result.log_path.display(),
        ));
    }
    out
}

/// Render results as pretty-printed JSON, for machine consumption.
pub fn render_json(results: &[TaskResult]) -> Result<String> {
    serde_json::to_string_pretty(results).context("serialize results to JSON")
}
