//! Command: parse, compile and run scripts.
use anyhow::Result;
use std::sync::Arc;

use crate::cli::ScriptOpts;
use crate::config::Settings;
use crate::logging::Logger;

/// Run the apply command.
///
/// # Errors
///
/// Returns an error if a script cannot be read or compiled, or a block
/// fails while running.
pub fn run(settings: &Settings, opts: &ScriptOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&super::version::version_line());
    if settings.dry_run {
        log.warn("dry run: no changes will be made");
    }
    let mut engine = super::load_engine(settings, &opts.files, log)?;

    log.stage("Compiling");
    let units = engine.compile()?.len();
    log.debug(&format!("{units} units compiled"));

    log.stage("Running");
    let result = engine.execute(log.as_ref());
    log.print_summary();
    result?;

    if log.has_failures() {
        anyhow::bail!("one or more blocks failed");
    }
    Ok(())
}
