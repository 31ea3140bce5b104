//! Builds the Coveralls job document from reader output.

use std::borrow::Cow;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde_json::Map;

use crate::config::Config;
use crate::domain::{CoverageReport, GitInfo, SourceFileCoverage};
use crate::error::Result;
use crate::fs::FileSystem;
use crate::reader::{CoverageData, FileCoverage};

/// Timestamp layout expected by the Coveralls API.
pub const RUN_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Build a report from coverage data.
///
/// Source text is read from the tree under `config.root`; the caller must
/// make sure it is the tree that was measured. Files are emitted in key
/// order so identical inputs serialize identically, and keys produced by
/// the reader are unique so names are too.
pub fn build_report<F: FileSystem>(
    config: &Config,
    git: Option<GitInfo>,
    data: &CoverageData,
    fs: &F,
    run_at: DateTime<Utc>,
) -> Result<CoverageReport> {
    let mut source_files = Vec::with_capacity(data.len());
    for (path, coverage) in data {
        let source = fs.read_to_string(&config.root.join(path))?;
        source_files.push(SourceFileCoverage {
            name: report_name(path),
            coverage: line_coverage(&source, coverage),
            source: Some(source),
            extra: Map::new(),
        });
    }

    Ok(CoverageReport {
        service_name: config.service_name.clone(),
        service_job_id: config.ci.job_id.clone(),
        service_number: config.ci.number.clone(),
        service_pull_request: config.ci.pull_request.clone(),
        repo_token: config.repo_token.clone(),
        parallel: config.parallel,
        flag_name: config.flag_name.clone(),
        git,
        source_files,
        run_at: run_at.format(RUN_AT_FORMAT).to_string(),
    })
}

/// One entry per source line: excluded and non-executable lines are `None`.
pub fn line_coverage(source: &str, coverage: &FileCoverage) -> Vec<Option<u64>> {
    (1..=source.lines().count() as u32)
        .map(|line| {
            if coverage.excluded.contains(&line) {
                None
            } else if let Some(count) = coverage.hits.get(&line) {
                Some(*count)
            } else if coverage.executable.contains(&line) {
                Some(0)
            } else {
                None
            }
        })
        .collect()
}

/// Render a coverage key with forward slashes.
fn report_name(key: &Path) -> String {
    let mut name = String::new();
    for component in key.components() {
        let part = match component {
            Component::Prefix(prefix) => {
                name.push_str(&prefix.as_os_str().to_string_lossy());
                continue;
            }
            Component::RootDir => {
                name.push('/');
                continue;
            }
            Component::CurDir => continue,
            Component::ParentDir => Cow::Borrowed(".."),
            Component::Normal(part) => part.to_string_lossy(),
        };
        if !name.is_empty() && !name.ends_with('/') {
            name.push('/');
        }
        name.push_str(&part);
    }
    name
}
