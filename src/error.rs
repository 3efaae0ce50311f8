//! Domain-specific error types for the configuration engine.
//!
//! Internal modules return typed errors ([`ScriptError`], [`ResourceError`],
//! [`ConfigError`]) while command handlers at the CLI boundary convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! EngineError
//! ├── Config(ConfigError)      settings file
//! ├── Script(ScriptError)      compiling and running scripts
//! ├── Resource(ResourceError)  host collaborators
//! └── Platform(PlatformError)  host introspection
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use crate::resources::error::ResourceError;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A script failed to translate, compile or run.
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// A collaborator operation failed outside of a script.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Host facts could not be determined.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Errors from loading the TOML settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("IO error reading config file {}: {source}", path.display())]
    Io {
        /// Path to the settings file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for the expected schema.
    #[error("Invalid config file {}: {message}", path.display())]
    Parse {
        /// Path to the settings file.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

/// Errors raised while translating, compiling or executing scripts.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// An attribute name or value has no mapping for the action.
    #[error("{message}")]
    UnknownParameter {
        /// Full diagnostic, naming the offending keys or value.
        message: String,
    },

    /// A line could not be translated or parsed.
    #[error("{file} line {line}: {message}")]
    Syntax {
        /// Script file the line came from.
        file: String,
        /// One-based source line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// None of the required packages is installed; the unit is skipped.
    #[error("Skipping - package {packages} not installed")]
    PackageNotInstalled {
        /// Comma-separated list of the packages that were checked.
        packages: String,
    },

    /// The script asked to stop; the unit is skipped.
    #[error("exit requested: {message}")]
    ExitRequested {
        /// Reason given by the script.
        message: String,
    },

    /// The script needs a newer engine.
    #[error("script requires engine version {required}, this is {running}")]
    Version {
        /// Version demanded by the script.
        required: String,
        /// Version of the running engine.
        running: String,
    },

    /// The script raised an error explicitly.
    #[error("{0}")]
    Raised(String),

    /// A value had the wrong type for an operation.
    #[error("type error: {0}")]
    Type(String),

    /// A collaborator failed while serving a builtin.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl ScriptError {
    /// Build an [`ScriptError::UnknownParameter`].
    pub fn unknown_parameter(message: impl Into<String>) -> Self {
        Self::UnknownParameter {
            message: message.into(),
        }
    }

    /// Build a [`ScriptError::Syntax`] for `file` at `line`.
    pub fn syntax(file: &Path, line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            file: file.display().to_string(),
            line,
            message: message.into(),
        }
    }

    /// Whether this error marks the unit as skipped for the rest of the run.
    #[must_use]
    pub const fn skips_unit(&self) -> bool {
        matches!(
            self,
            Self::PackageNotInstalled { .. } | Self::ExitRequested { .. }
        )
    }
}

/// Errors that arise from host introspection.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// A host fact could not be read.
    #[error("Platform detection failed: {0}")]
    DetectionFailed(String),
}
