// Shared helpers for integration tests.
//
// Provides an engine wired to the real filesystem with a fixed host name and
// package list, plus a `Log` implementation that records block results, so
// each test can run scripts against a temporary directory.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cfenjin::engine::Engine;
use cfenjin::engine::classes::ClassSet;
use cfenjin::engine::state::{EngineState, EngineVersion};
use cfenjin::exec::SystemExecutor;
use cfenjin::logging::{Log, UnitStatus};
use cfenjin::monitor::{FlowMonitor, Message, MessageKind, Observer};
use cfenjin::resources::fileops::SystemFileOps;
use cfenjin::resources::package::PackageQuery;

/// Host name every test engine runs as.
pub const HOSTNAME: &str = "testhost";

/// Packages reported as installed.
#[derive(Debug, Default)]
pub struct StaticPackages(pub Vec<String>);

impl PackageQuery for StaticPackages {
    fn has_package(&self, name: &str) -> bool {
        self.0.iter().any(|p| p == name)
    }
}

/// [`Log`] that keeps block results and messages in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    units: Mutex<Vec<(String, UnitStatus, Option<String>)>>,
    lines: Mutex<Vec<String>>,
}

impl RecordingLog {
    /// Recorded `(name, status, message)` triples.
    pub fn units(&self) -> Vec<(String, UnitStatus, Option<String>)> {
        self.units.lock().unwrap().clone()
    }

    /// Statuses in record order.
    pub fn statuses(&self) -> Vec<UnitStatus> {
        self.units().into_iter().map(|(_, status, _)| status).collect()
    }

    /// Every logged line.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    fn push(&self, prefix: &str, msg: &str) {
        self.lines.lock().unwrap().push(format!("{prefix}{msg}"));
    }
}

impl Log for RecordingLog {
    fn stage(&self, msg: &str) {
        self.push("==> ", msg);
    }
    fn info(&self, msg: &str) {
        self.push("", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("[debug] ", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("[warn] ", msg);
    }
    fn error(&self, msg: &str) {
        self.push("[error] ", msg);
    }
    fn dry_run(&self, msg: &str) {
        self.push("[dry run] ", msg);
    }
    fn record_unit(&self, name: &str, status: UnitStatus, message: Option<&str>) {
        self.units
            .lock()
            .unwrap()
            .push((name.to_string(), status, message.map(String::from)));
    }
}

/// Observer keeping every message, optionally vetoing intentions.
#[derive(Debug, Default)]
pub struct Recorder {
    messages: Mutex<Vec<Message>>,
    veto: bool,
}

impl Recorder {
    /// Texts of messages of `kind`.
    pub fn texts(&self, kind: MessageKind) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.text.clone())
            .collect()
    }
}

impl Observer for Recorder {
    fn handle(&self, message: &Message) -> bool {
        self.messages.lock().unwrap().push(message.clone());
        !(self.veto && message.kind == MessageKind::Intention)
    }
}

/// Builder for a test engine.
pub struct EngineBuilder {
    packages: Vec<String>,
    site: BTreeMap<String, cfenjin::engine::value::Value>,
    strict: bool,
    vetoing: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            packages: Vec::new(),
            site: BTreeMap::new(),
            strict: false,
            vetoing: false,
        }
    }

    /// Report `names` as installed.
    pub fn packages(mut self, names: &[&str]) -> Self {
        self.packages = names.iter().map(ToString::to_string).collect();
        self
    }

    /// Preset a site variable.
    pub fn site(mut self, name: &str, value: impl Into<cfenjin::engine::value::Value>) -> Self {
        self.site.insert(name.to_string(), value.into());
        self
    }

    pub const fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Veto every change, as dry-run mode does.
    pub const fn dry_run(mut self) -> Self {
        self.vetoing = true;
        self
    }

    pub fn build(self) -> (Engine, Arc<Recorder>) {
        let monitor = Arc::new(FlowMonitor::new());
        let recorder = Arc::new(Recorder {
            messages: Mutex::default(),
            veto: self.vetoing,
        });
        monitor.register(recorder.clone());
        let state = EngineState {
            classes: ClassSet::empty(HOSTNAME),
            site: self.site,
            strict: self.strict,
            dry_run: self.vetoing,
            user: "tester".to_string(),
            home: PathBuf::from("/home/tester"),
            version: EngineVersion::current(),
            fs: Arc::new(SystemFileOps::new(Arc::clone(&monitor))),
            packages: Arc::new(StaticPackages(self.packages)),
            executor: Arc::new(SystemExecutor),
            monitor,
        };
        (Engine::new(state), recorder)
    }
}

/// Write `text` to `dir/name` and return the path.
pub fn write_script(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write script");
    path
}

/// Permission bits of `path`.
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::metadata(path).expect("metadata").permissions().mode() & 0o7777
}
