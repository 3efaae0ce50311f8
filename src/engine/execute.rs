//! Runs compiled units against their per-file instances.
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use super::codetree::CompiledUnit;
use super::compile::report_failure;
use super::runtime::UnitInstance;
use super::state::EngineState;
use super::value::Value;
use crate::error::ScriptError;

/// What happened when a unit ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The method ran to the end.
    Completed,
    /// The file's instance is skipped for the rest of the run.
    Skipped {
        /// Why the file is skipped.
        reason: String,
    },
    /// Setup methods only run when their instance is created.
    Initializer,
}

enum Slot {
    Active(UnitInstance),
    SkippedForever { reason: String },
}

/// Owns one runtime instance per script file.
#[derive(Default)]
pub struct UnitExecutor {
    initializers: HashMap<String, CompiledUnit>,
    slots: HashMap<String, Slot>,
}

impl fmt::Debug for UnitExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let skipped: Vec<&String> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::SkippedForever { .. }))
            .map(|(name, _)| name)
            .collect();
        f.debug_struct("UnitExecutor")
            .field("units", &self.slots.len())
            .field("skipped", &skipped)
            .finish_non_exhaustive()
    }
}

fn skip_reason(err: &ScriptError) -> String {
    match err {
        ScriptError::PackageNotInstalled { packages } => format!("package {packages} not installed"),
        other => other.to_string(),
    }
}

impl UnitExecutor {
    /// Executor that knows the setup method of every unit in `units`.
    #[must_use]
    pub fn new(units: &[CompiledUnit]) -> Self {
        let initializers = units
            .iter()
            .filter(|u| u.is_initializer())
            .map(|u| (u.unit_name.clone(), u.clone()))
            .collect();
        Self {
            initializers,
            slots: HashMap::new(),
        }
    }

    /// Instance of `unit_name`, if it has been created and not skipped.
    #[must_use]
    pub fn instance(&self, unit_name: &str) -> Option<&UnitInstance> {
        match self.slots.get(unit_name) {
            Some(Slot::Active(instance)) => Some(instance),
            _ => None,
        }
    }

    /// Whether `unit_name` has been skipped for the rest of the run.
    #[must_use]
    pub fn is_skipped(&self, unit_name: &str) -> bool {
        matches!(self.slots.get(unit_name), Some(Slot::SkippedForever { .. }))
    }

    fn initialize(&self, state: &mut EngineState, unit: &CompiledUnit) -> Result<UnitInstance, ScriptError> {
        let mut instance = UnitInstance::new(&unit.unit_name);
        let Some(setup) = self.initializers.get(&unit.unit_name) else {
            return Ok(instance);
        };
        let source_dir = unit
            .block
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let args = vec![
            Value::from(state.classes.hostname()),
            Value::from(source_dir.display().to_string()),
            Value::from(state.home.display().to_string()),
            Value::from(state.user.as_str()),
        ];
        tracing::debug!("creating instance {}", unit.unit_name);
        instance.invoke(state, setup, args)?;
        Ok(instance)
    }

    /// Run `unit`, creating its file's instance on first use.
    ///
    /// A missing package or an `exit_script` marks the file skipped and is
    /// not an error; every later block of that file is skipped too.
    ///
    /// # Errors
    ///
    /// Any other failure is logged with the block listing and returned.
    pub fn execute(&mut self, state: &mut EngineState, unit: &CompiledUnit) -> Result<Outcome, ScriptError> {
        if unit.is_initializer() {
            return Ok(Outcome::Initializer);
        }
        let name = unit.unit_name.clone();
        if let Some(Slot::SkippedForever { reason }) = self.slots.get(&name) {
            tracing::debug!("skipping {name}.{}: {reason}", unit.method_name);
            return Ok(Outcome::Skipped {
                reason: reason.clone(),
            });
        }

        let mut instance = match self.slots.remove(&name) {
            Some(Slot::Active(instance)) => instance,
            _ => match self.initialize(state, unit) {
                Ok(instance) => instance,
                Err(err) => return self.fail(&name, unit, 0, err),
            },
        };
        let result = instance.invoke(state, unit, Vec::new());
        let line = instance.line();
        self.slots.insert(name.clone(), Slot::Active(instance));
        match result {
            Ok(()) => Ok(Outcome::Completed),
            Err(err) => self.fail(&name, unit, line, err),
        }
    }

    fn fail(&mut self, name: &str, unit: &CompiledUnit, line: usize, err: ScriptError) -> Result<Outcome, ScriptError> {
        if err.skips_unit() {
            let reason = skip_reason(&err);
            tracing::debug!("{name} skipped for the rest of the run: {reason}");
            self.slots.insert(
                name.to_string(),
                Slot::SkippedForever {
                    reason: reason.clone(),
                },
            );
            return Ok(Outcome::Skipped { reason });
        }
        report_failure(&unit.block, line, &err);
        Err(err)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::engine::compile::compile_tree;
    use crate::engine::segment::parse_source;
    use crate::engine::test_helpers::{TestHost, recording_state};
    use crate::engine::codetree::CodeTree;
    use crate::engine::translate::Translator;
    use std::sync::Arc;

    fn units(state: &EngineState, sources: &[(&str, &str)]) -> Vec<CompiledUnit> {
        let mut tree = CodeTree::new();
        for (label, text) in sources {
            parse_source(&mut tree, Path::new(label), text);
        }
        compile_tree(&mut Translator::new(Arc::clone(&state.monitor)), &tree).unwrap()
    }

    fn run_all(executor: &mut UnitExecutor, state: &mut EngineState, units: &[CompiledUnit]) -> Vec<Outcome> {
        units
            .iter()
            .map(|u| executor.execute(state, u).unwrap())
            .collect()
    }

    #[test]
    fn instance_is_shared_by_blocks_of_one_file() {
        let (mut state, _recorder) = recording_state(TestHost::default());
        let units = units(
            &state,
            &[("conf/a.cf", "control:\n  @n = 1\neditfiles:\n  @n = @n + 1\n")],
        );
        let mut executor = UnitExecutor::new(&units);
        let outcomes = run_all(&mut executor, &mut state, &units);
        assert_eq!(
            outcomes,
            vec![Outcome::Initializer, Outcome::Completed, Outcome::Completed]
        );
        let instance = executor.instance(&units[1].unit_name).unwrap();
        assert_eq!(instance.var("n"), Some(&Value::Int(2)));
        assert_eq!(instance.var("sourcepath"), Some(&Value::from("conf")));
        assert_eq!(instance.var("hostname"), Some(&Value::from("host1")));
    }

    #[test]
    fn missing_package_skips_only_its_file() {
        let (mut state, _recorder) = recording_state(TestHost::default());
        let units = units(
            &state,
            &[
                ("a.cf", "control:\n  package 'samba'\ncontrol:\n  $ran_a = 1\n"),
                ("b.cf", "control:\n  $ran_b = 1\n"),
            ],
        );
        let mut executor = UnitExecutor::new(&units);
        let outcomes = run_all(&mut executor, &mut state, &units);
        let skipped = Outcome::Skipped {
            reason: "package samba not installed".to_string(),
        };
        assert_eq!(outcomes[1], skipped);
        assert_eq!(outcomes[2], skipped);
        assert_eq!(outcomes[4], Outcome::Completed);
        assert!(executor.is_skipped(&units[1].unit_name));
        assert!(state.site.get("ran_a").is_none());
        assert_eq!(state.site.get("ran_b"), Some(&Value::Int(1)));
    }

    #[test]
    fn exit_script_skips_remaining_blocks() {
        let (mut state, _recorder) = recording_state(TestHost::default());
        let units = units(
            &state,
            &[("a.cf", "control:\n  exit_script 'not here'\nfiles:\n  /etc/motd m=644\n")],
        );
        let mut executor = UnitExecutor::new(&units);
        let outcomes = run_all(&mut executor, &mut state, &units);
        assert!(matches!(outcomes[2], Outcome::Skipped { .. }));
    }

    #[test]
    fn other_errors_propagate() {
        let (mut state, _recorder) = recording_state(TestHost::default());
        let units = units(&state, &[("a.cf", "control:\n  raise 'broken'\n")]);
        let mut executor = UnitExecutor::new(&units);
        executor.execute(&mut state, &units[0]).unwrap();
        let err = executor.execute(&mut state, &units[1]).unwrap_err();
        assert_eq!(err.to_string(), "broken");
        assert!(!executor.is_skipped(&units[1].unit_name));
    }
}
