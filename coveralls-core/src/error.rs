//! Error types for coverage reporting.

use std::{error::Error, fmt, io, path::PathBuf};

/// Error type for every coverage reporting operation.
#[derive(Debug)]
pub enum CoverallsError {
    /// Missing repo token or an unusable rcfile.
    Configuration(String),
    /// The coverage data store is missing or malformed.
    CoverageData(String),
    /// The coverage data store references a file that no longer exists.
    NoSource(PathBuf),
    /// A merge input could not be read or parsed.
    Merge(String),
    /// The upload failed or the remote API rejected it.
    Transport {
        /// Short description of the failure.
        message: String,
        /// Raw response body, when the server answered.
        response: Option<String>,
    },
    /// An underlying I/O error.
    Io(io::Error),
    /// A defect rather than an expected failure mode.
    Unexpected(String),
    /// A catch-all error with a message.
    Other(String),
}

impl CoverallsError {
    /// Build a transport error without a response body.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            response: None,
        }
    }

    /// Build a transport error carrying the raw response text.
    pub fn transport_with_response(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            response: Some(response.into()),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Unexpected(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CoverallsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::CoverageData(message) => write!(f, "coverage data error: {message}"),
            Self::NoSource(path) => write!(f, "no source for code: '{}'", path.display()),
            Self::Merge(message) => write!(f, "merge error: {message}"),
            Self::Transport { message, .. } => write!(f, "transport error: {message}"),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Unexpected(message) => write!(f, "unexpected error: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CoverallsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CoverallsError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Convenience result type for coverage reporting.
pub type Result<T> = std::result::Result<T, CoverallsError>;
