//! The script engine: segmentation, translation, compilation, execution.
//!
//! A run goes through four stages:
//!
//! 1. [`segment`] splits each file into action blocks.
//! 2. [`translate`] rewrites every block's lines into the scripting form,
//!    turning guards into `if` scopes and `$name` into site lookups.
//! 3. [`compile`] parses the translated lines into instruction trees.
//! 4. [`execute`] runs every block in order against its file's instance.
//!
//! [`Engine`] strings the stages together.
pub mod builtins;
pub mod classes;
pub mod codetree;
pub mod compile;
pub mod conditional;
pub mod execute;
pub mod options;
pub mod runtime;
pub mod segment;
pub mod state;
pub mod syntax;
pub mod translate;
pub mod value;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::path::Path;
use std::sync::Arc;

use crate::error::ScriptError;
use crate::logging::{Log, UnitStatus};
use codetree::{CodeTree, CompiledUnit};
use execute::{Outcome, UnitExecutor};
use state::EngineState;
use translate::Translator;

/// Parses, compiles and runs a set of scripts.
#[derive(Debug)]
pub struct Engine {
    tree: CodeTree,
    translator: Translator,
    state: EngineState,
    units: Vec<CompiledUnit>,
}

impl Engine {
    /// Engine over `state`; site variables already in `state` are
    /// substituted in scripts as if a `control` block had set them.
    #[must_use]
    pub fn new(state: EngineState) -> Self {
        let translator =
            Translator::new(Arc::clone(&state.monitor)).with_site_names(state.site.keys().cloned());
        Self {
            tree: CodeTree::new(),
            translator,
            state,
            units: Vec::new(),
        }
    }

    /// Read and segment `file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn parse(&mut self, file: &Path) -> Result<(), ScriptError> {
        segment::parse(&mut self.tree, file)?;
        Ok(())
    }

    /// Segment in-memory `text`, reported as coming from `label`.
    pub fn parse_source(&mut self, label: &Path, text: &str) {
        segment::parse_source(&mut self.tree, label, text);
    }

    /// Blocks parsed so far.
    #[must_use]
    pub const fn tree(&self) -> &CodeTree {
        &self.tree
    }

    /// Run-wide state.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Compile every parsed block.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError::Syntax`]; nothing has run yet.
    pub fn compile(&mut self) -> Result<&[CompiledUnit], ScriptError> {
        self.units = compile::compile_tree(&mut self.translator, &self.tree)?;
        Ok(&self.units)
    }

    /// Run every compiled block in order, recording each in `log`.
    ///
    /// Compiles first when blocks were parsed since the last
    /// [`compile`](Self::compile).
    ///
    /// # Errors
    ///
    /// Stops at the first block that fails for a reason other than a
    /// missing package or `exit_script`.
    pub fn execute(&mut self, log: &dyn Log) -> Result<(), ScriptError> {
        if self.units.len() != self.tree.len() {
            self.compile()?;
        }
        let completed = if self.state.dry_run {
            UnitStatus::DryRun
        } else {
            UnitStatus::Ok
        };
        let mut executor = UnitExecutor::new(&self.units);
        for unit in &self.units {
            let name = format!("{}.{}", unit.unit_name, unit.method_name);
            match executor.execute(&mut self.state, unit) {
                Ok(Outcome::Initializer) => {}
                Ok(Outcome::Completed) => log.record_unit(&name, completed, None),
                Ok(Outcome::Skipped { reason }) => {
                    log.record_unit(&name, UnitStatus::Skipped, Some(&reason));
                }
                Err(err) => {
                    log.record_unit(&name, UnitStatus::Failed, Some(&err.to_string()));
                    return Err(err);
                }
            }
        }
        log.info(&self.state.classes.to_string());
        Ok(())
    }

    /// Listing of every parsed block.
    #[must_use]
    pub fn dump(&self) -> String {
        self.tree.dump()
    }

    /// Listing of every compiled unit.
    #[must_use]
    pub fn dump_compiled(&self) -> String {
        compile::dump_compiled(&self.units)
    }
}
