//! Command-line interface definition.
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI entry point for the configuration engine.
#[derive(Parser, Debug)]
#[command(
    name = "cfenjin",
    about = "Host configuration engine driven by declarative action scripts",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Flags shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// More output; repeat for more detail
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Trace level; any non-zero value shows everything
    #[arg(short, long, global = true, value_name = "LEVEL")]
    pub trace: Option<u8>,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Report changes without applying them
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Fail on copy and link problems instead of reporting them
    #[arg(long, global = true)]
    pub strict: bool,

    /// Put the host into these classes
    #[arg(short = 'D', long = "define", global = true, value_delimiter = ',', value_name = "CLASS")]
    pub define: Vec<String>,

    /// Never let these classes gain members
    #[arg(short = 'U', long = "undefine", global = true, value_delimiter = ',', value_name = "CLASS")]
    pub undefine: Vec<String>,

    /// Settings file (default: ~/.config/cfenjin/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse, compile and run scripts
    Apply(ScriptOpts),
    /// Parse and compile scripts without running them
    Check(ScriptOpts),
    /// Print segmented blocks or compiled units
    Dump(DumpOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Apply(_) => "apply",
            Self::Check(_) => "check",
            Self::Dump(_) => "dump",
            Self::Version => "version",
        }
    }
}

/// Scripts to process.
#[derive(Parser, Debug, Clone)]
pub struct ScriptOpts {
    /// Script files, run in the order given
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Options for the `dump` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct DumpOpts {
    /// Print compiled units instead of segmented blocks
    #[arg(long)]
    pub compiled: bool,

    /// Scripts to list.
    #[command(flatten)]
    pub scripts: ScriptOpts,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_apply_with_files() {
        let cli = Cli::parse_from(["cfenjin", "apply", "a.cf", "b.cf"]);
        assert!(matches!(&cli.command, Command::Apply(_)), "Expected Apply command");
        if let Command::Apply(opts) = cli.command {
            assert_eq!(opts.files, vec![PathBuf::from("a.cf"), PathBuf::from("b.cf")]);
        }
    }

    #[test]
    fn apply_needs_files() {
        assert!(Cli::try_parse_from(["cfenjin", "apply"]).is_err());
    }

    #[test]
    fn verbosity_counts() {
        let cli = Cli::parse_from(["cfenjin", "-vvv", "check", "a.cf"]);
        assert_eq!(cli.global.verbose, 3);
        let cli = Cli::parse_from(["cfenjin", "check", "a.cf", "-v"]);
        assert_eq!(cli.global.verbose, 1);
    }

    #[test]
    fn class_lists_split_on_commas() {
        let cli = Cli::parse_from(["cfenjin", "-D", "web,db", "-U", "mail", "-D", "x", "apply", "a.cf"]);
        assert_eq!(cli.global.define, vec!["web", "db", "x"]);
        assert_eq!(cli.global.undefine, vec!["mail"]);
    }

    #[test]
    fn dry_run_and_strict() {
        let cli = Cli::parse_from(["cfenjin", "-n", "--strict", "apply", "a.cf"]);
        assert!(cli.global.dry_run);
        assert!(cli.global.strict);
        let cli = Cli::parse_from(["cfenjin", "--dry-run", "apply", "a.cf"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn dump_compiled_flag() {
        let cli = Cli::parse_from(["cfenjin", "dump", "--compiled", "a.cf"]);
        assert!(matches!(&cli.command, Command::Dump(_)), "Expected Dump command");
        if let Command::Dump(opts) = cli.command {
            assert!(opts.compiled);
            assert_eq!(opts.scripts.files.len(), 1);
        }
    }

    #[test]
    fn trace_and_config() {
        let cli = Cli::parse_from(["cfenjin", "-t", "2", "--config", "/etc/c.toml", "version"]);
        assert_eq!(cli.global.trace, Some(2));
        assert_eq!(cli.global.config, Some(PathBuf::from("/etc/c.toml")));
        assert_eq!(cli.command.name(), "version");
    }
}
