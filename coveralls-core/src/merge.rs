//! Merging partial reports from other test shards.

use std::path::Path;

use serde::Deserialize;

use crate::domain::{CoverageReport, SourceFileCoverage};
use crate::error::{CoverallsError, Result};
use crate::fs::FileSystem;

#[derive(Debug, Deserialize)]
struct MergeInput {
    #[serde(default)]
    source_files: Option<Vec<SourceFileCoverage>>,
}

/// Merge the `source_files` of a JSON report file into `report`.
///
/// Entries keep any fields this crate does not model. A document without
/// `source_files` merges nothing. Returns the number of entries merged.
pub fn merge_report_file<F: FileSystem>(
    report: &mut CoverageReport,
    fs: &F,
    path: &Path,
) -> Result<usize> {
    let contents = fs.read_to_string(path).map_err(|err| {
        CoverallsError::Merge(format!("couldn't read {}: {err}", path.display()))
    })?;
    let input: MergeInput = serde_json::from_str(&contents).map_err(|err| {
        CoverallsError::Merge(format!("invalid report in {}: {err}", path.display()))
    })?;
    let Some(files) = input.source_files else {
        log::info!("No data to be merged");
        return Ok(0);
    };
    let merged = files.len();
    merge_source_files(report, files);
    Ok(merged)
}

/// Insert files keyed by name; an incoming file replaces one with the same
/// name in place, otherwise it is appended.
pub fn merge_source_files(report: &mut CoverageReport, files: Vec<SourceFileCoverage>) {
    for file in files {
        match report
            .source_files
            .iter_mut()
            .find(|existing| existing.name == file.name)
        {
            Some(existing) => {
                log::debug!("merged report replaces {}", file.name);
                *existing = file;
            }
            None => report.source_files.push(file),
        }
    }
}
