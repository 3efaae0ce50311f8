#![allow(clippy::expect_used, clippy::unwrap_used, clippy::wildcard_imports, clippy::indexing_slicing)]

//! Scripts run end to end against a temporary directory.

mod common;

use common::*;

use cfenjin::engine::value::Value;
use cfenjin::error::ScriptError;
use cfenjin::logging::UnitStatus;
use cfenjin::monitor::MessageKind;
use std::fs;
use std::path::Path;

/// A script exercising every file action on paths below `root`.
fn host_script(root: &Path) -> String {
    let r = root.display();
    format!(
        "groups:\n  web = ( {HOSTNAME} )\n\
         directories:\n  web::\n    {r}/www m=750\n  db::\n    {r}/db\n\
         copy:\n  {r}/src.conf dest={r}/www/app.conf m=640\n\
         links:\n  {r}/current -> {r}/www\n\
         tidy:\n  {r}/cache p=*.tmp\n\
         editfiles:\n  ef = EditFile.new \"{r}/hosts\"\n  ef.AppendIfNoSuchLine '10.0.0.1 gw'\n  ef.write\n"
    )
}

fn seed(root: &Path) {
    fs::write(root.join("src.conf"), "listen 80\n").unwrap();
    fs::write(root.join("hosts"), "127.0.0.1 localhost\n").unwrap();
    fs::create_dir(root.join("cache")).unwrap();
    fs::write(root.join("cache/a.tmp"), "").unwrap();
    fs::write(root.join("cache/keep.db"), "").unwrap();
}

#[test]
fn applies_every_action() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    seed(root);
    let script = write_script(root, "site.cf", &host_script(root));

    let (mut engine, _recorder) = EngineBuilder::new().build();
    engine.parse(&script).unwrap();
    let log = RecordingLog::default();
    engine.execute(&log).unwrap();

    assert!(root.join("www").is_dir());
    assert_eq!(mode_of(&root.join("www")), 0o750);
    assert!(!root.join("db").exists(), "db:: guard must not match");

    let copied = root.join("www/app.conf");
    assert_eq!(fs::read_to_string(&copied).unwrap(), "listen 80\n");
    assert_eq!(mode_of(&copied), 0o640);

    assert_eq!(fs::read_link(root.join("current")).unwrap(), root.join("www"));

    assert!(!root.join("cache/a.tmp").exists());
    assert!(root.join("cache/keep.db").exists());

    assert_eq!(
        fs::read_to_string(root.join("hosts")).unwrap(),
        "127.0.0.1 localhost\n10.0.0.1 gw\n"
    );

    assert!(log.statuses().iter().all(|s| *s == UnitStatus::Ok));
    assert_eq!(log.units().len(), 6);
}

#[test]
fn second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    seed(root);
    let script = write_script(root, "site.cf", &host_script(root));

    let (mut first, _) = EngineBuilder::new().build();
    first.parse(&script).unwrap();
    first.execute(&RecordingLog::default()).unwrap();

    let (mut second, recorder) = EngineBuilder::new().build();
    second.parse(&script).unwrap();
    second.execute(&RecordingLog::default()).unwrap();

    let done: Vec<String> = recorder
        .texts(MessageKind::Info)
        .into_iter()
        .filter(|t| t.ends_with(" - done"))
        .collect();
    assert!(done.is_empty(), "unexpected changes: {done:?}");
    assert!(!root.join("www/app.conf.cfsaved").exists());
}

#[test]
fn dry_run_leaves_files_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    seed(root);
    let script = write_script(root, "site.cf", &host_script(root));

    let (mut engine, recorder) = EngineBuilder::new().dry_run().build();
    engine.parse(&script).unwrap();
    let log = RecordingLog::default();
    engine.execute(&log).unwrap();

    assert!(!root.join("www").exists());
    assert!(!root.join("current").exists());
    assert!(root.join("cache/a.tmp").exists());
    assert!(log.statuses().iter().all(|s| *s == UnitStatus::DryRun));

    let vetoed = recorder.texts(MessageKind::Verbose);
    assert!(
        vetoed
            .iter()
            .any(|t| t == &format!("create directory {} - pre-empted", root.join("www").display()))
    );
}

#[test]
fn missing_package_skips_only_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_script(
        dir.path(),
        "samba.cf",
        "control:\n  package 'samba'\ncontrol:\n  $samba_seen = 1\n",
    );
    let b = write_script(dir.path(), "base.cf", "control:\n  $base_seen = 1\n");

    let (mut engine, _) = EngineBuilder::new().build();
    engine.parse(&a).unwrap();
    engine.parse(&b).unwrap();
    let log = RecordingLog::default();
    engine.execute(&log).unwrap();

    assert_eq!(
        log.statuses(),
        vec![UnitStatus::Skipped, UnitStatus::Skipped, UnitStatus::Ok]
    );
    let units = log.units();
    assert_eq!(units[0].2.as_deref(), Some("package samba not installed"));
    assert!(units[2].0.starts_with("Base_"));
    assert!(engine.state().site.get("samba_seen").is_none());
    assert_eq!(engine.state().site.get("base_seen"), Some(&Value::Int(1)));
}

#[test]
fn installed_package_runs() {
    let (mut engine, _) = EngineBuilder::new().packages(&["samba"]).build();
    engine.parse_source(
        Path::new("samba.cf"),
        "control:\n  package 'samba'\n  $samba_seen = 1\n",
    );
    engine.execute(&RecordingLog::default()).unwrap();
    assert_eq!(engine.state().site.get("samba_seen"), Some(&Value::Int(1)));
}

#[test]
fn preset_site_variables_reach_scripts() {
    let (mut engine, _) = EngineBuilder::new().site("role", "web").build();
    engine.parse_source(
        Path::new("site.cf"),
        "control:\n  $greeting = \"role is #{$role}\"\n",
    );
    engine.execute(&RecordingLog::default()).unwrap();
    assert_eq!(
        engine.state().site.get("greeting"),
        Some(&Value::from("role is web"))
    );
}

#[test]
fn unrecognised_action_is_skipped_with_warning() {
    let (mut engine, recorder) = EngineBuilder::new().build();
    engine.parse_source(Path::new("p.cf"), "processes:\n  sshd restart\n");
    let log = RecordingLog::default();
    engine.execute(&log).unwrap();

    assert_eq!(log.statuses(), vec![UnitStatus::Ok]);
    assert!(
        recorder
            .texts(MessageKind::Verbose)
            .iter()
            .any(|t| t.starts_with("Warning: undefined user action processes"))
    );
}

#[test]
fn syntax_error_stops_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("marker");
    let (mut engine, _) = EngineBuilder::new().build();
    engine.parse_source(
        Path::new("bad.cf"),
        &format!(
            "directories:\n  {}\ngroups:\n  puts 1\n",
            marker.display()
        ),
    );
    let log = RecordingLog::default();
    let err = engine.execute(&log).unwrap_err();

    assert!(matches!(err, ScriptError::Syntax { .. }));
    assert!(err.to_string().starts_with("bad.cf line 4: Illegal groups command"));
    assert!(log.units().is_empty());
    assert!(!marker.exists());
}

#[test]
fn strict_mode_fails_on_missing_copy_source() {
    let dir = tempfile::tempdir().unwrap();
    let r = dir.path().display();
    let text = format!("copy:\n  {r}/absent dest={r}/out\ncontrol:\n  $after = 1\n");

    let (mut relaxed, _) = EngineBuilder::new().build();
    relaxed.parse_source(Path::new("c.cf"), &text);
    relaxed.execute(&RecordingLog::default()).unwrap();
    assert_eq!(relaxed.state().site.get("after"), Some(&Value::Int(1)));

    let (mut strict, _) = EngineBuilder::new().strict().build();
    strict.parse_source(Path::new("c.cf"), &text);
    let log = RecordingLog::default();
    assert!(strict.execute(&log).is_err());
    assert_eq!(log.statuses(), vec![UnitStatus::Failed]);
    assert!(strict.state().site.get("after").is_none());
}
