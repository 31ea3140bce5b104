//! Coverage data store readers.
//!
//! Two store formats are understood: the JSON export written by
//! `coverage json` and LCOV tracefiles. The format is detected from the
//! content, so the data file may have any name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::config::ExclusionRules;
use crate::error::{CoverallsError, Result};
use crate::fs::FileSystem;

/// Execution data for one tracked file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCoverage {
    /// Line numbers that can execute.
    pub executable: BTreeSet<u32>,
    /// Hit counts for executed lines.
    pub hits: BTreeMap<u32, u64>,
    /// Line numbers excluded from coverage accounting.
    pub excluded: BTreeSet<u32>,
}

impl FileCoverage {
    fn record(&mut self, line: u32, count: u64) {
        if self.excluded.contains(&line) {
            return;
        }
        self.executable.insert(line);
        if count > 0 {
            let hits = self.hits.entry(line).or_insert(0);
            *hits = hits.saturating_add(count);
        }
    }

    fn absorb(&mut self, other: FileCoverage) {
        for line in other.executable {
            let count = other.hits.get(&line).copied().unwrap_or(0);
            self.record(line, count);
        }
        for line in other.excluded {
            self.exclude(line);
        }
    }

    fn exclude(&mut self, line: u32) {
        self.excluded.insert(line);
        self.executable.remove(&line);
        self.hits.remove(&line);
    }
}

/// Per-file execution data keyed by [`source_key`].
pub type CoverageData = BTreeMap<PathBuf, FileCoverage>;

/// On-disk formats a coverage data store can take.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreFormat {
    /// `coverage json` export.
    CoveragePyJson,
    /// LCOV tracefile.
    Lcov,
}

impl StoreFormat {
    /// Detect the format from the store contents.
    pub fn detect(contents: &str) -> Self {
        if contents.trim_start().starts_with('{') {
            Self::CoveragePyJson
        } else {
            Self::Lcov
        }
    }
}

/// Read a coverage data store and apply exclusion rules.
///
/// Fails with [`CoverallsError::NoSource`] when a tracked file is missing
/// from `root`, since that means the data belongs to a different tree.
pub fn read_coverage<F: FileSystem>(
    fs: &F,
    data_file: &Path,
    root: &Path,
    exclusions: &ExclusionRules,
) -> Result<CoverageData> {
    if !fs.is_file(data_file) {
        return Err(CoverallsError::CoverageData(format!(
            "no data to report: {} not found",
            data_file.display()
        )));
    }
    let contents = fs.read_to_string(data_file).map_err(|err| {
        CoverallsError::CoverageData(format!("couldn't read {}: {err}", data_file.display()))
    })?;

    let recorded = match StoreFormat::detect(&contents) {
        StoreFormat::CoveragePyJson => parse_coverage_json(&contents)?,
        StoreFormat::Lcov => parse_lcov(&contents)?,
    };
    let mut data = CoverageData::new();
    for (path, coverage) in recorded {
        let key = source_key(&path, root);
        if key.is_absolute() || key.starts_with("..") {
            log::warn!("{} is outside {}", path.display(), root.display());
        }
        data.entry(key).or_default().absorb(coverage);
    }
    log::debug!(
        "read {} tracked files from {}",
        data.len(),
        data_file.display()
    );

    for (path, coverage) in data.iter_mut() {
        let full_path = root.join(path);
        if !fs.is_file(&full_path) {
            return Err(CoverallsError::NoSource(path.clone()));
        }
        if exclusions.is_empty() {
            continue;
        }
        let source = fs.read_to_string(&full_path)?;
        for (index, line) in source.lines().enumerate() {
            if exclusions.is_excluded(line) {
                coverage.exclude(index as u32 + 1);
            }
        }
    }

    Ok(data)
}

/// Key a path recorded in a store by its location relative to `root`.
///
/// `.` segments are dropped and `..` segments folded into the preceding
/// directory. Paths outside `root` keep their leading `..`, or stay
/// absolute, so they never collide with files inside it.
pub fn source_key(path: &Path, root: &Path) -> PathBuf {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut key = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(key.components().next_back(), Some(Component::Normal(_))) {
                    key.pop();
                } else {
                    key.push("..");
                }
            }
            other => key.push(other.as_os_str()),
        }
    }
    key
}

#[derive(Debug, Deserialize)]
struct CoveragePyReport {
    files: BTreeMap<String, CoveragePyFile>,
}

#[derive(Debug, Deserialize)]
struct CoveragePyFile {
    #[serde(default)]
    executed_lines: Vec<u32>,
    #[serde(default)]
    missing_lines: Vec<u32>,
    #[serde(default)]
    excluded_lines: Vec<u32>,
}

fn parse_coverage_json(contents: &str) -> Result<CoverageData> {
    let report: CoveragePyReport = serde_json::from_str(contents)
        .map_err(|err| CoverallsError::CoverageData(format!("invalid coverage json: {err}")))?;

    let mut data = CoverageData::new();
    for (path, file) in report.files {
        let mut coverage = FileCoverage::default();
        for line in file.executed_lines {
            coverage.record(line, 1);
        }
        for line in file.missing_lines {
            coverage.record(line, 0);
        }
        for line in file.excluded_lines {
            coverage.exclude(line);
        }
        data.insert(PathBuf::from(path), coverage);
    }
    Ok(data)
}

fn parse_lcov(contents: &str) -> Result<CoverageData> {
    let mut data = CoverageData::new();
    let mut current: Option<(PathBuf, FileCoverage)> = None;

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(path) = line.strip_prefix("SF:") {
            if let Some((path, coverage)) = current.take() {
                data.entry(path).or_default().absorb(coverage);
            }
            current = Some((PathBuf::from(path.trim()), FileCoverage::default()));
        } else if let Some(record) = line.strip_prefix("DA:") {
            let Some((_, coverage)) = current.as_mut() else {
                return Err(lcov_error(index, "DA record outside of SF block"));
            };
            let mut fields = record.split(',');
            let line_no = fields
                .next()
                .and_then(|value| value.trim().parse::<u32>().ok())
                .filter(|line_no| *line_no > 0)
                .ok_or_else(|| lcov_error(index, "invalid line number"))?;
            let count = fields
                .next()
                .and_then(|value| parse_count(value.trim()))
                .ok_or_else(|| lcov_error(index, "invalid hit count"))?;
            coverage.record(line_no, count);
        } else if line == "end_of_record" {
            if let Some((path, coverage)) = current.take() {
                data.entry(path).or_default().absorb(coverage);
            }
        }
    }
    if let Some((path, coverage)) = current.take() {
        data.entry(path).or_default().absorb(coverage);
    }

    Ok(data)
}

// Some generators emit counts like `1.5e3` or negative overflow values.
fn parse_count(value: &str) -> Option<u64> {
    if let Ok(count) = value.parse::<u64>() {
        return Some(count);
    }
    if value.starts_with('-') && value[1..].chars().all(|c| c.is_ascii_digit()) {
        return Some(0);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|count| count.is_finite() && *count >= 0.0)
        .map(|count| count as u64)
}

fn lcov_error(index: usize, reason: &str) -> CoverallsError {
    CoverallsError::CoverageData(format!("lcov line {}: {reason}", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use std::collections::HashMap;

    const COVERAGE_JSON: &str = r#"{
        "meta": {"version": "7.4.0"},
        "files": {
            "pkg/app.py": {
                "executed_lines": [1, 2, 4],
                "missing_lines": [5],
                "excluded_lines": [7],
                "summary": {"covered_lines": 3}
            }
        },
        "totals": {}
    }"#;

    const LCOV: &str = "\
TN:
SF:src/lib.rs
DA:1,4
DA:2,0
DA:3,2,abcdef
end_of_record
SF:src/main.rs
DA:1,1
end_of_record
";

    fn fs_with(files: &[(&str, &str)]) -> MockFileSystem {
        let files: HashMap<PathBuf, String> = files
            .iter()
            .map(|(path, contents)| (PathBuf::from(path), contents.to_string()))
            .collect();
        let lookup = files.clone();
        let mut fs = MockFileSystem::new();
        fs.expect_is_file()
            .returning(move |path| lookup.contains_key(path));
        fs.expect_read_to_string().returning(move |path| {
            files.get(path).cloned().ok_or_else(|| {
                CoverallsError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            })
        });
        fs
    }

    #[test]
    fn detects_store_format() {
        assert_eq!(StoreFormat::detect("  {\"files\": {}}"), StoreFormat::CoveragePyJson);
        assert_eq!(StoreFormat::detect("TN:\nSF:a.rs\n"), StoreFormat::Lcov);
    }

    #[test]
    fn reads_coverage_py_json() {
        let fs = fs_with(&[
            ("/p/coverage.json", COVERAGE_JSON),
            ("/p/pkg/app.py", "a = 1\nb = 2\n\nc()\nd()\n\n# skip\n"),
        ]);
        let data = read_coverage(
            &fs,
            Path::new("/p/coverage.json"),
            Path::new("/p"),
            &ExclusionRules::none(),
        )
        .expect("coverage");

        let file = &data[Path::new("pkg/app.py")];
        assert_eq!(file.executable, BTreeSet::from([1, 2, 4, 5]));
        assert_eq!(file.hits, BTreeMap::from([(1, 1), (2, 1), (4, 1)]));
        assert_eq!(file.excluded, BTreeSet::from([7]));
    }

    #[test]
    fn reads_lcov_with_hit_counts() {
        let fs = fs_with(&[
            ("/p/lcov.info", LCOV),
            ("/p/src/lib.rs", "fn a() {}\nfn b() {}\nfn c() {}\n"),
            ("/p/src/main.rs", "fn main() {}\n"),
        ]);
        let data = read_coverage(
            &fs,
            Path::new("/p/lcov.info"),
            Path::new("/p"),
            &ExclusionRules::none(),
        )
        .expect("coverage");

        assert_eq!(data.len(), 2);
        let lib = &data[Path::new("src/lib.rs")];
        assert_eq!(lib.executable, BTreeSet::from([1, 2, 3]));
        assert_eq!(lib.hits, BTreeMap::from([(1, 4), (3, 2)]));
    }

    #[test]
    fn repeated_lcov_blocks_sum_counts() {
        let lcov = "SF:a.rs\nDA:1,2\nend_of_record\nSF:a.rs\nDA:1,3\nDA:2,0\nend_of_record\n";
        let data = parse_lcov(lcov).expect("lcov");
        let file = &data[Path::new("a.rs")];
        assert_eq!(file.hits, BTreeMap::from([(1, 5)]));
        assert_eq!(file.executable, BTreeSet::from([1, 2]));
    }

    #[test]
    fn exclusion_rules_null_out_matching_lines() {
        let fs = fs_with(&[
            ("/p/coverage.json", COVERAGE_JSON),
            (
                "/p/pkg/app.py",
                "a = 1\nb = 2  # pragma: no cover\n\nc()\nd()\n",
            ),
        ]);
        let rules = ExclusionRules::new(&[crate::config::DEFAULT_EXCLUDE]).expect("rules");
        let data = read_coverage(&fs, Path::new("/p/coverage.json"), Path::new("/p"), &rules)
            .expect("coverage");

        let file = &data[Path::new("pkg/app.py")];
        assert!(file.excluded.contains(&2));
        assert!(!file.executable.contains(&2));
        assert!(!file.hits.contains_key(&2));
    }

    #[test]
    fn missing_source_file_is_no_source_error() {
        let fs = fs_with(&[("/p/coverage.json", COVERAGE_JSON)]);
        let err = read_coverage(
            &fs,
            Path::new("/p/coverage.json"),
            Path::new("/p"),
            &ExclusionRules::none(),
        )
        .unwrap_err();
        match err {
            CoverallsError::NoSource(path) => assert_eq!(path, PathBuf::from("pkg/app.py")),
            other => panic!("expected NoSource, got {other:?}"),
        }
    }

    #[test]
    fn missing_data_file_is_coverage_data_error() {
        let fs = fs_with(&[]);
        let err = read_coverage(
            &fs,
            Path::new("/p/coverage.json"),
            Path::new("/p"),
            &ExclusionRules::none(),
        )
        .unwrap_err();
        assert!(matches!(err, CoverallsError::CoverageData(_)));
        assert!(err.to_string().contains("no data to report"));
    }

    #[test]
    fn malformed_stores_are_rejected() {
        let err = parse_coverage_json("{\"files\": 3}").unwrap_err();
        assert!(err.to_string().contains("invalid coverage json"));

        let err = parse_lcov("DA:1,1\n").unwrap_err();
        assert!(err.to_string().contains("outside of SF"));

        let err = parse_lcov("SF:a.rs\nDA:x,1\n").unwrap_err();
        assert!(err.to_string().contains("lcov line 2: invalid line number"));
    }

    #[test]
    fn equivalent_store_paths_share_one_entry() {
        let lcov = "SF:/p/a.rs\nDA:1,1\nend_of_record\n\
                    SF:a.rs\nDA:1,4\nDA:2,0\nend_of_record\n\
                    SF:./a.rs\nDA:3,0\nend_of_record\n";
        let fs = fs_with(&[("/p/lcov.info", lcov), ("/p/a.rs", "x\ny\nz\n")]);
        let data = read_coverage(
            &fs,
            Path::new("/p/lcov.info"),
            Path::new("/p"),
            &ExclusionRules::none(),
        )
        .expect("coverage");

        assert_eq!(data.len(), 1);
        let file = &data[Path::new("a.rs")];
        assert_eq!(file.executable, BTreeSet::from([1, 2, 3]));
        assert_eq!(file.hits, BTreeMap::from([(1, 5)]));
    }

    #[test]
    fn source_keys_are_relative_to_root() {
        let root = Path::new("/p");
        assert_eq!(source_key(Path::new("/p/src/lib.rs"), root), PathBuf::from("src/lib.rs"));
        assert_eq!(source_key(Path::new("./src/../lib.rs"), root), PathBuf::from("lib.rs"));
        assert_eq!(
            source_key(Path::new("../shared/x.py"), root),
            PathBuf::from("../shared/x.py")
        );
        assert_eq!(
            source_key(Path::new("/usr/lib/x.py"), root),
            PathBuf::from("/usr/lib/x.py")
        );
    }

    #[test]
    fn huge_repeated_counts_saturate() {
        let lcov = "SF:a.rs\nDA:1,1e30\nend_of_record\nSF:a.rs\nDA:1,1\nend_of_record\n";
        let data = parse_lcov(lcov).expect("lcov");
        assert_eq!(data[Path::new("a.rs")].hits, BTreeMap::from([(1, u64::MAX)]));
    }

    #[test]
    fn parses_unusual_hit_counts() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("-1"), Some(0));
        assert_eq!(parse_count("1.5e3"), Some(1500));
        assert_eq!(parse_count("many"), None);
    }
}
