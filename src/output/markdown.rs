//! Markdown run report generation
//!
//! Writes a human-readable summary of every stage of a run, including the
//! URLs that failed and why.

use crate::output::{OutputResult, RunSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Failed URLs listed per stage before the list is truncated
const MAX_LISTED_FAILURES: usize = 50;

/// Writes the markdown report for a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_report(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(summary);

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_report(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Mise Crawl Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
        let duration = (*finished - summary.started_at).num_seconds();
        md.push_str(&format!(
            "- **Duration**: {} seconds ({:.2} minutes)\n",
            duration,
            duration as f64 / 60.0
        ));
    }
    if let Some(hash) = &summary.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    match &summary.aborted {
        Some(reason) => md.push_str(&format!("- **Status**: aborted ({})\n\n", reason)),
        None => md.push_str("- **Status**: completed\n\n"),
    }

    md.push_str("## Stages\n\n");
    md.push_str("| Stage | Input | Skipped | Done | Failed | Retries | Hangs | Restarts | Success |\n");
    md.push_str("|-------|-------|---------|------|--------|---------|-------|----------|---------|\n");
    for report in &summary.stages {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {:.1}% |\n",
            report.stage,
            report.input_total,
            report.skipped_existing + report.skipped_rejected + report.skipped_cursor,
            report.done,
            report.failed,
            report.retried,
            report.hang_timeouts,
            report.session_restarts,
            report.success_rate()
        ));
    }
    md.push('\n');

    for report in summary.stages.iter().filter(|r| !r.failed_items.is_empty()) {
        md.push_str(&format!("## Failed URLs: {}\n\n", report.stage));
        md.push_str("| URL | Attempts | Error |\n");
        md.push_str("|-----|----------|-------|\n");
        for item in report.failed_items.iter().take(MAX_LISTED_FAILURES) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                item.url,
                item.attempts,
                item.error.replace('|', "\\|")
            ));
        }
        if report.failed_items.len() > MAX_LISTED_FAILURES {
            md.push_str(&format!(
                "\n... and {} more\n",
                report.failed_items.len() - MAX_LISTED_FAILURES
            ));
        }
        md.push('\n');
    }

    md
}
