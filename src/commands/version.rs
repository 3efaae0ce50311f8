//! Command: print version information.
use std::io::Write as _;

/// Build description: the pinned or `git describe` version, else the
/// package version.
pub const BUILD_VERSION: &str = match option_env!("CFENJIN_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// Version line, e.g. `cfenjin 0.1.0`.
#[must_use]
pub fn version_line() -> String {
    format!("cfenjin {BUILD_VERSION}")
}

/// Print the version to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn run() -> std::io::Result<()> {
    writeln!(std::io::stdout().lock(), "{}", version_line())
}
