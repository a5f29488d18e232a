//! Typed error handling for macvis.
//!
//! Only fatal conditions live here. Recoverable problems found while scanning
//! (malformed directives, redefinitions, unresolved includes) are collected as
//! [`crate::report::Warning`]s, and visibility findings (conflicts, leaks) are
//! part of the [`crate::report::Report`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for macvis operations.
#[derive(Error, Debug)]
pub enum MacvisError {
    /// A configured input file does not exist. Always fatal.
    #[error("Missing file: {path}")]
    MissingFile { path: PathBuf },

    /// I/O error when reading a file that does exist
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A `#define` / `#undef` line that could not be parsed
    #[error("Malformed directive in {path}:{line}: {message}")]
    MalformedDirective {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Manifest errors (syntax, duplicate names, unknown references)
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Library dependencies form a cycle
    #[error("Cyclic library dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// Invalid argument provided
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl MacvisError {
    /// Create a missing file error.
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    /// Create an I/O error with path context.
    ///
    /// `NotFound` is mapped to [`MacvisError::MissingFile`].
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::missing(path);
        }
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a malformed directive error.
    pub fn malformed(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::MalformedDirective {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a cyclic dependency error.
    pub fn cycle(cycle: Vec<String>) -> Self {
        Self::CyclicDependency { cycle }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::MissingFile { path } => Some(path),
            Self::Io { path, .. } => Some(path),
            Self::MalformedDirective { path, .. } => Some(path),
            Self::Config { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Convenience type alias for macvis results.
pub type MacvisResult<T> = Result<T, MacvisError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> MacvisResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> MacvisResult<T> {
        self.map_err(|e| MacvisError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_becomes_missing_file() {
        let err = MacvisError::io(
            PathBuf::from("/proj/lib.c"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        assert!(matches!(err, MacvisError::MissingFile { .. }));
        assert_eq!(err.path(), Some(&PathBuf::from("/proj/lib.c")));
        assert_eq!(err.to_string(), "Missing file: /proj/lib.c");
    }

    #[test]
    fn test_other_io_errors_keep_source() {
        let err = MacvisError::io(
            "/proj/lib.c",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, MacvisError::Io { source: Some(_), .. }));
    }

    #[test]
    fn test_cycle_message() {
        let err = MacvisError::cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Cyclic library dependency: a -> b -> a");
        assert!(err.path().is_none());
    }

    #[test]
    fn test_io_result_ext() {
        let result: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let mapped = result.with_path("/missing/lib.h");
        assert!(matches!(mapped, Err(MacvisError::MissingFile { .. })));
    }
}
