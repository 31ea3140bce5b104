//! Report rendering utilities.

use serde::Serialize;

use crate::domain::{CoverageReport, CoverageSummary};

/// Render a payload as compact JSON, the form uploaded and written to disk.
pub fn render_json<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(payload)
}

/// Render a payload as indented JSON for humans.
pub fn render_json_pretty<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(payload)
}

/// Count relevant and covered lines across a report.
pub fn summarize(report: &CoverageReport) -> CoverageSummary {
    let mut summary = CoverageSummary {
        files: report.source_files.len(),
        ..CoverageSummary::default()
    };
    for file in &report.source_files {
        for hits in file.coverage.iter().flatten() {
            summary.relevant_lines += 1;
            if *hits > 0 {
                summary.covered_lines += 1;
            }
        }
    }
    if summary.relevant_lines > 0 {
        summary.percent = summary.covered_lines as f64 / summary.relevant_lines as f64 * 100.0;
    }
    summary
}

/// One-line human summary, e.g. `3 files, 40/50 lines covered (80.00%)`.
pub fn format_summary(summary: &CoverageSummary) -> String {
    format!(
        "{} files, {}/{} lines covered ({:.2}%)",
        summary.files, summary.covered_lines, summary.relevant_lines, summary.percent
    )
}
