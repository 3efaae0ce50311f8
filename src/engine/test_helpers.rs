//! Engine state wired to real files and a fake host, for unit tests.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::classes::ClassSet;
use super::state::{EngineState, EngineVersion};
use crate::exec::SystemExecutor;
use crate::monitor::FlowMonitor;
use crate::monitor::test_helpers::RecordingObserver;
use crate::resources::fileops::SystemFileOps;
use crate::resources::package::PackageQuery;

/// Host facts for a test run.
#[derive(Debug, Clone)]
pub struct TestHost {
    pub hostname: String,
    pub packages: Vec<String>,
}

impl Default for TestHost {
    fn default() -> Self {
        Self {
            hostname: "host1".to_string(),
            packages: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct StaticPackages(Vec<String>);

impl PackageQuery for StaticPackages {
    fn has_package(&self, name: &str) -> bool {
        self.0.iter().any(|p| p == name)
    }
}

/// State for `host` whose monitor reports to the returned recorder.
pub fn recording_state(host: TestHost) -> (EngineState, Arc<RecordingObserver>) {
    let monitor = Arc::new(FlowMonitor::new());
    let recorder = Arc::new(RecordingObserver::default());
    monitor.register(recorder.clone());
    let state = EngineState {
        classes: ClassSet::empty(host.hostname),
        site: BTreeMap::new(),
        strict: false,
        dry_run: false,
        user: "tester".to_string(),
        home: PathBuf::from("/home/tester"),
        version: EngineVersion::current(),
        fs: Arc::new(SystemFileOps::new(Arc::clone(&monitor))),
        packages: Arc::new(StaticPackages(host.packages)),
        executor: Arc::new(SystemExecutor),
        monitor,
    };
    (state, recorder)
}
