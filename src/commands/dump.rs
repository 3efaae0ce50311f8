//! Command: print segmented blocks or compiled units.
use anyhow::Result;
use std::io::Write as _;
use std::sync::Arc;

use crate::cli::DumpOpts;
use crate::config::Settings;
use crate::logging::Logger;

/// Run the dump command, writing the listing to stdout.
///
/// # Errors
///
/// Returns an error if a script cannot be read, does not compile (with
/// `--compiled`), or stdout cannot be written.
pub fn run(settings: &Settings, opts: &DumpOpts, log: &Arc<Logger>) -> Result<()> {
    let mut engine = super::load_engine(settings, &opts.scripts.files, log)?;
    let listing = if opts.compiled {
        engine.compile()?;
        engine.dump_compiled()
    } else {
        engine.dump()
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(listing.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
