//! `cfenjin` command-line entry point.
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use cfenjin::cli::{self, Command};
use cfenjin::commands;
use cfenjin::config::Settings;
use cfenjin::logging::{self, Logger};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    if matches!(args.command, Command::Version) {
        commands::version::run()?;
        return Ok(());
    }

    let settings = Settings::load(args.global.config.as_deref())?.with_overrides(&args.global);
    let level = logging::console_level(settings.verbose, args.global.quiet, settings.trace > 0);
    let name = args.command.name();
    logging::init_subscriber(level, name);
    let log = Arc::new(Logger::new(name));

    match &args.command {
        Command::Apply(opts) => commands::apply::run(&settings, opts, &log),
        Command::Check(opts) => commands::check::run(&settings, opts, &log),
        Command::Dump(opts) => commands::dump::run(&settings, opts, &log),
        Command::Version => Ok(()),
    }
}
