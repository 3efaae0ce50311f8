//! Command: syntax-check scripts without running them.
use anyhow::Result;
use std::sync::Arc;

use crate::cli::ScriptOpts;
use crate::config::Settings;
use crate::logging::Logger;

/// Run the check command.
///
/// # Errors
///
/// Returns an error if a script cannot be read or does not compile.
pub fn run(settings: &Settings, opts: &ScriptOpts, log: &Arc<Logger>) -> Result<()> {
    let mut engine = super::load_engine(settings, &opts.files, log)?;
    log.stage("Compiling");
    let units = engine.compile()?;
    let blocks = units.iter().filter(|u| !u.is_initializer()).count();
    log.info(&format!("{blocks} blocks compiled, syntax OK"));
    Ok(())
}
