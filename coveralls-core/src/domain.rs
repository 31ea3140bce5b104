//! Domain entities for the Coveralls job document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON job document sent to the Coveralls API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// CI service or tool name reported to Coveralls.
    pub service_name: String,
    /// CI job identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_job_id: Option<String>,
    /// CI build number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_number: Option<String>,
    /// Pull request number, when building one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_pull_request: Option<String>,
    /// Repository token authenticating the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_token: Option<String>,
    /// Whether this job is one shard of a parallel build.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallel: bool,
    /// Label distinguishing parallel shards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_name: Option<String>,
    /// Commit metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    /// Per-file coverage, in discovery order.
    pub source_files: Vec<SourceFileCoverage>,
    /// Time the report was built.
    pub run_at: String,
}

/// Line coverage for a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileCoverage {
    /// Path relative to the project root.
    pub name: String,
    /// Full file text; merged entries may carry a `source_digest` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Hit count per source line; `None` marks a non-executable line.
    #[serde(default)]
    pub coverage: Vec<Option<u64>>,
    /// Fields passed through from merged reports, e.g. `branches`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Git metadata attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    /// Branch name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// The commit being reported.
    pub head: GitHead,
    /// Configured remotes.
    #[serde(default)]
    pub remotes: Vec<GitRemote>,
}

/// The commit a report belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHead {
    /// Commit SHA.
    pub id: String,
    /// Author name.
    #[serde(default)]
    pub author_name: String,
    /// Author email.
    #[serde(default)]
    pub author_email: String,
    /// Committer name.
    #[serde(default)]
    pub committer_name: String,
    /// Committer email.
    #[serde(default)]
    pub committer_email: String,
    /// Commit subject line.
    #[serde(default)]
    pub message: String,
}

/// A git remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRemote {
    /// Remote name, e.g. `origin`.
    pub name: String,
    /// Fetch URL.
    pub url: String,
}

/// Aggregate line counts over a report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoverageSummary {
    /// Number of tracked files.
    pub files: usize,
    /// Executable lines.
    pub relevant_lines: usize,
    /// Executable lines hit at least once.
    pub covered_lines: usize,
    /// Covered percentage (0-100).
    pub percent: f64,
}
