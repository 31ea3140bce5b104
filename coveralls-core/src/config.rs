//! Configuration resolution from the environment and the rcfile.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::ci::{CiMetadata, detect_ci};
use crate::error::{CoverallsError, Result};
use crate::fs::FileSystem;
use crate::rcfile::{RcFile, parse_bool};

/// Rcfile read when `--rcfile` is not given.
pub const DEFAULT_RCFILE: &str = ".coveragerc";
/// Coverage data store read when the rcfile does not name one.
pub const DEFAULT_DATA_FILE: &str = "coverage.json";
/// Service name used when nothing else provides one.
pub const DEFAULT_SERVICE_NAME: &str = "coveralls-rs";
/// Exclusion regex applied when the rcfile does not override it.
pub const DEFAULT_EXCLUDE: &str = r"#\s*(pragma|PRAGMA)[:\s]?\s*(no|NO)\s*(cover|COVER)";

/// Source of environment variables.
pub trait Environment {
    /// Return the variable's value, treating blank values as unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// Environment backed by the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }
}

/// Inputs to configuration resolution supplied by the caller.
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    /// Whether a repo token must be present.
    pub token_required: bool,
    /// Explicit rcfile path; `None` falls back to [`DEFAULT_RCFILE`] if present.
    pub rcfile: Option<PathBuf>,
    /// Service name given on the command line.
    pub service_name: Option<String>,
    /// Project root that relative paths resolve against.
    pub root: PathBuf,
}

/// Regexes marking source lines as excluded from coverage accounting.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    patterns: Vec<Regex>,
}

impl ExclusionRules {
    /// Compile exclusion patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern.as_ref()).map_err(|err| {
                    CoverallsError::Configuration(format!(
                        "invalid exclude_lines pattern {:?}: {err}",
                        pattern.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Rules that exclude nothing.
    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Whether any pattern matches the line.
    pub fn is_excluded(&self, line: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(line))
    }

    /// Whether there are no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Service name reported to Coveralls.
    pub service_name: String,
    /// Repository token.
    pub repo_token: Option<String>,
    /// CI vendor metadata.
    pub ci: CiMetadata,
    /// Whether this job is a parallel shard.
    pub parallel: bool,
    /// Shard label.
    pub flag_name: Option<String>,
    /// Path of the coverage data store, resolved against `root`.
    pub data_file: PathBuf,
    /// Exclusion rules for source lines.
    pub exclusions: ExclusionRules,
    /// Project root.
    pub root: PathBuf,
}

impl Config {
    /// Resolve configuration from the rcfile and environment.
    pub fn resolve<F: FileSystem>(
        options: &ConfigOptions,
        fs: &F,
        env: &dyn Environment,
    ) -> Result<Self> {
        let rc = load_rcfile(options, fs)?;
        let ci = detect_ci(env);

        let service_name = options
            .service_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| env.var("COVERALLS_SERVICE_NAME"))
            .or_else(|| rc.get("coveralls", "service_name").map(str::to_string))
            .or_else(|| ci.service_name.clone())
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        let repo_token = env.var("COVERALLS_REPO_TOKEN");
        if options.token_required && repo_token.is_none() && !authenticates_by_job(&service_name, &ci)
        {
            return Err(CoverallsError::Configuration(
                "no repo token found; set the COVERALLS_REPO_TOKEN environment variable".to_string(),
            ));
        }

        let parallel = match env.var("COVERALLS_PARALLEL") {
            Some(value) => parse_bool(&value).unwrap_or(false),
            None => rc.get_bool("coveralls", "parallel")?.unwrap_or(false),
        };
        let flag_name = env
            .var("COVERALLS_FLAG_NAME")
            .or_else(|| rc.get("coveralls", "flag_name").map(str::to_string));

        let data_file = options
            .root
            .join(rc.get("run", "data_file").unwrap_or(DEFAULT_DATA_FILE));
        let exclusions = match rc.get_lines("report", "exclude_lines") {
            Some(patterns) => ExclusionRules::new(&patterns)?,
            None => ExclusionRules::new(&[DEFAULT_EXCLUDE])?,
        };

        Ok(Self {
            service_name,
            repo_token,
            ci,
            parallel,
            flag_name,
            data_file,
            exclusions,
            root: options.root.clone(),
        })
    }
}

fn load_rcfile<F: FileSystem>(options: &ConfigOptions, fs: &F) -> Result<RcFile> {
    match options.rcfile.as_ref() {
        Some(path) => {
            let path = resolve_path(&options.root, path);
            let contents = fs.read_to_string(&path).map_err(|err| {
                CoverallsError::Configuration(format!(
                    "couldn't read config file {}: {err}",
                    path.display()
                ))
            })?;
            RcFile::parse(&contents)
        }
        None => {
            let path = options.root.join(DEFAULT_RCFILE);
            if !fs.is_file(&path) {
                return Ok(RcFile::default());
            }
            RcFile::parse(&fs.read_to_string(&path)?)
        }
    }
}

fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn authenticates_by_job(service_name: &str, ci: &CiMetadata) -> bool {
    service_name.starts_with("travis") && ci.job_id.is_some()
}
