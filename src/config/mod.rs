//! Run settings: the optional TOML file merged with command-line flags.
pub mod toml_loader;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::cli::GlobalOpts;
use crate::engine::value::Value;
use crate::error::ConfigError;

/// Settings for one run.
///
/// ```toml
/// dry_run = false
/// strict = true
/// verbose = 1
/// defines = ["webserver"]
///
/// [site]
/// masterfiles = "/srv/cfenjin/masterfiles"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Veto every change and report what would happen.
    pub dry_run: bool,
    /// Raise on failed copies and links.
    pub strict: bool,
    /// Monitor verbosity (`-v` count).
    pub verbose: u8,
    /// Trace level; non-zero shows everything.
    pub trace: u8,
    /// Classes the host is put into before any script runs.
    pub defines: Vec<String>,
    /// Classes that may never gain members.
    pub undefines: Vec<String>,
    /// Site variables visible to scripts as `$name`.
    pub site: BTreeMap<String, toml::Value>,
}

fn site_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Str(s.clone()),
        toml::Value::Integer(n) => Value::Int(*n),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Array(items) => Value::List(items.iter().map(site_value).collect()),
        toml::Value::Table(table) => Value::Map(
            table
                .iter()
                .map(|(k, v)| (k.clone(), site_value(v)))
                .collect(),
        ),
        other => Value::Str(other.to_string()),
    }
}

impl Settings {
    /// Load the settings file: `explicit` if given, else the default path.
    ///
    /// A missing default file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing or any file
    /// cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            return toml_loader::load_config(path);
        }
        toml_loader::default_path().map_or_else(|| Ok(Self::default()), |path| toml_loader::load_config(&path))
    }

    /// Apply command-line flags: booleans and levels override, class lists
    /// are appended.
    #[must_use]
    pub fn with_overrides(mut self, opts: &GlobalOpts) -> Self {
        self.dry_run |= opts.dry_run;
        self.strict |= opts.strict;
        self.verbose = self.verbose.max(opts.verbose);
        self.trace = self.trace.max(opts.trace.unwrap_or(0));
        self.defines.extend(opts.define.iter().cloned());
        self.undefines.extend(opts.undefine.iter().cloned());
        self
    }

    /// Site variables converted to script values.
    #[must_use]
    pub fn site_values(&self) -> BTreeMap<String, Value> {
        self.site
            .iter()
            .map(|(name, value)| (name.clone(), site_value(value)))
            .collect()
    }
}
