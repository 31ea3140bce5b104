#![deny(missing_docs)]
//! Coveralls core library.
//!
//! Resolves configuration, reads coverage data stores, and builds the JSON
//! job document accepted by the Coveralls API.

pub mod builder;
pub mod ci;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs;
pub mod git;
pub mod merge;
pub mod rcfile;
pub mod reader;
pub mod report;

pub use builder::{RUN_AT_FORMAT, build_report, line_coverage};
pub use ci::{CiMetadata, detect_ci};
pub use config::{Config, ConfigOptions, Environment, ExclusionRules, ProcessEnvironment};
pub use domain::{CoverageReport, CoverageSummary, GitHead, GitInfo, GitRemote, SourceFileCoverage};
pub use error::{CoverallsError, Result};
pub use fs::{FileSystem, StdFileSystem};
pub use git::{GitCommand, SystemGit, collect_git_info};
pub use merge::{merge_report_file, merge_source_files};
pub use reader::{CoverageData, FileCoverage, StoreFormat, read_coverage, source_key};
pub use report::{format_summary, render_json, render_json_pretty, summarize};
