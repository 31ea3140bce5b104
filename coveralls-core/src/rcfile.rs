//! Parser for `.coveragerc`-style INI files.

use std::collections::BTreeMap;

use crate::error::{CoverallsError, Result};

/// Parsed INI sections, keyed by lowercased section and option names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RcFile {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl RcFile {
    /// Parse rcfile contents.
    ///
    /// Indented lines continue the previous option's value on a new line.
    /// Lines starting with `#` or `;` are comments.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut section: Option<String> = None;
        let mut last_key: Option<String> = None;

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(' ') || raw.starts_with('\t');
            if indented {
                if let (Some(name), Some(key)) = (section.as_ref(), last_key.as_ref()) {
                    let value = sections
                        .get_mut(name)
                        .and_then(|options| options.get_mut(key))
                        .ok_or_else(|| malformed(line_no, "dangling continuation line"))?;
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                    continue;
                }
                return Err(malformed(line_no, "continuation line without an option"));
            }

            if let Some(header) = trimmed.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| malformed(line_no, "unterminated section header"))?
                    .trim()
                    .to_lowercase();
                sections.entry(name.clone()).or_default();
                section = Some(name);
                last_key = None;
                continue;
            }

            let Some(name) = section.as_ref() else {
                return Err(malformed(line_no, "option outside of a section"));
            };
            let split = trimmed
                .find(['=', ':'])
                .ok_or_else(|| malformed(line_no, "expected `key = value`"))?;
            let key = trimmed[..split].trim().to_lowercase();
            if key.is_empty() {
                return Err(malformed(line_no, "empty option name"));
            }
            let value = trimmed[split + 1..].trim().to_string();
            sections
                .entry(name.clone())
                .or_default()
                .insert(key.clone(), value);
            last_key = Some(key);
        }

        Ok(Self { sections })
    }

    /// Look up a raw option value.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(&section.to_lowercase())
            .and_then(|options| options.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    /// Look up an option as a list, one entry per non-empty line.
    pub fn get_lines(&self, section: &str, key: &str) -> Option<Vec<String>> {
        self.get(section, key).map(|value| {
            value
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    /// Look up an option as a boolean.
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get(section, key) {
            None => Ok(None),
            Some(value) => parse_bool(value).map(Some).ok_or_else(|| {
                CoverallsError::Configuration(format!(
                    "invalid boolean for [{section}] {key}: {value}"
                ))
            }),
        }
    }
}

/// Parse an INI-style boolean.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn malformed(line_no: usize, reason: &str) -> CoverallsError {
    CoverallsError::Configuration(format!("rcfile line {line_no}: {reason}"))
}
