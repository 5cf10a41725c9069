//! Errors surfaced by the façade and the CLI

use configmanager_secrets::{ErrorKind, SecretError};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for façade operations
pub type Result<T> = std::result::Result<T, ConfigManagerError>;

/// Façade error with diagnostic codes for CLI rendering
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigManagerError {
    /// Token resolution failed
    #[error(transparent)]
    #[diagnostic(code(configmanager::resolve))]
    Resolve(#[from] SecretError),

    /// JSON encoding or decoding of a record failed
    #[error(transparent)]
    #[diagnostic(code(configmanager::json))]
    Json(#[from] serde_json::Error),

    /// YAML decoding of a record failed
    #[error(transparent)]
    #[diagnostic(code(configmanager::yaml))]
    Yaml(#[from] serde_yaml::Error),

    /// Input bytes are not UTF-8 text
    #[error("input is not valid UTF-8: {0}")]
    #[diagnostic(code(configmanager::utf8))]
    Utf8(#[from] std::str::Utf8Error),

    /// The command was interrupted before it finished
    #[error("interrupted")]
    #[diagnostic(code(configmanager::interrupted))]
    Interrupted,

    /// Reading or writing a file failed
    #[error("failed to {operation} '{}'", path.display())]
    #[diagnostic(
        code(configmanager::io),
        help("Check file permissions and ensure the parent directory exists")
    )]
    Io {
        /// What was being attempted, e.g. "read"
        operation: &'static str,
        /// File involved
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },
}

impl ConfigManagerError {
    /// Wrap an I/O failure on `path`
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Resolution error kind, if this is a resolution error
    #[must_use]
    pub const fn secret_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Resolve(err) => Some(err.kind()),
            _ => None,
        }
    }
}
