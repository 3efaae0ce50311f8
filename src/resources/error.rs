//! Typed error variants for collaborator operations.
//!
//! [`ResourceError::NotFound`] is the typed "does not exist" condition that
//! the `files` builtin swallows and `copy` re-raises in strict mode.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the filesystem, editor and package collaborators.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A command invoked by a collaborator failed with a non-zero exit code.
    #[error("command '{program}' failed (exit {exit_code}): {stderr}")]
    ExecutionFailed {
        /// Name of the program that was invoked.
        program: String,
        /// Exit code returned by the process.
        exit_code: i32,
        /// Captured standard error output.
        stderr: String,
    },

    /// The target path does not exist.
    #[error("{} does not exist", path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// An operation was denied due to insufficient permissions.
    #[error("permission denied: {}", path.display())]
    PermissionDenied {
        /// Path for which permission was denied.
        path: PathBuf,
    },

    /// A resource exists but is in an unexpected state.
    #[error("invalid state for '{resource}': {reason}")]
    InvalidState {
        /// Name or description of the resource.
        resource: String,
        /// Why the state is invalid.
        reason: String,
    },

    /// A regular expression or glob did not compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern {
        /// The offending pattern text.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// An I/O call failed.
    #[error("{action} {}: {source}", path.display())]
    Io {
        /// Short verb phrase, e.g. `"copying"`.
        action: &'static str,
        /// Path the operation was working on.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl ResourceError {
    /// Wrap an [`std::io::Error`], turning `NotFound`/`PermissionDenied`
    /// kinds into their typed variants.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io {
                action,
                path,
                source,
            },
        }
    }

    /// Whether this is the typed "does not exist" error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
