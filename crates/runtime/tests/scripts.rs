//! End-to-end runs of the script backend

use parking_lot::Mutex;
use std::fs;
use std::sync::Arc;
use tweaker_core::BuildSettings;
use tweaker_runtime::{DirectorySource, MemorySource, ScriptBackend, Tweaker, UnitError};
use tweaker_scripting::{BracketRegistry, Natives, Value};

/// Backend whose `emit(x)` native collects its arguments
fn backend() -> (ScriptBackend, Arc<Mutex<Vec<String>>>) {
    let emitted = Arc::new(Mutex::new(Vec::new()));
    let sink = emitted.clone();
    let mut natives = Natives::with_defaults();
    natives.register("emit", Some(1), move |args| {
        sink.lock().push(args[0].to_string());
        Ok(Value::Null)
    });

    let backend = ScriptBackend::new(natives, BracketRegistry::with_namespaces(["item", "ore"]));
    (backend, emitted)
}

#[test]
fn test_units_of_a_group_share_globals() {
    let (backend, emitted) = backend();
    let tweaker = Tweaker::new(backend, BuildSettings::new());
    let source = MemorySource::new().with_text_group(
        "recipes",
        [
            ("recipes/base.zs", "global ingot = <ore:ingotIron>;\nfunction label(x) { return 'recipe:' ~ x; }"),
            ("recipes/tools.zs", "emit(label(ingot));\nvar n = 0;\nwhile (n < 3) { n += 1; }\nemit(n);"),
        ],
    );

    let report = tweaker.load(&source).unwrap();

    assert!(report.success(), "{:?}", report.messages());
    assert_eq!(*emitted.lock(), vec!["recipe:ore:ingotIron", "3"]);
}

#[test]
fn test_groups_do_not_share_globals() {
    let (backend, emitted) = backend();
    let tweaker = Tweaker::new(backend, BuildSettings::new());
    let source = MemorySource::new()
        .with_text_group("a.zs", [("a.zs", "global shared = 1; emit(shared);")])
        .with_text_group("b.zs", [("b.zs", "emit(shared);")]);

    let report = tweaker.load(&source).unwrap();

    assert_eq!(report.groups_built, 1);
    let failure = report.group_failures().next().unwrap();
    assert_eq!(failure.group, "b.zs");
    assert!(failure.message.contains("Undefined variable shared"), "{}", failure.message);
    assert_eq!(*emitted.lock(), vec!["1"]);
}

#[test]
fn test_bracket_suppression_by_unit_name() {
    let (backend, emitted) = backend();
    let mut tweaker = Tweaker::new(backend, BuildSettings::new());
    tweaker.suppress_bracket_errors("A.zs");

    let source = MemorySource::new()
        .with_text_group("A.zs", [("A.zs", "emit(<entity:pig>);")])
        .with_text_group("B.zs", [("B.zs", "emit(<entity:pig>);")]);

    let report = tweaker.load(&source).unwrap();

    assert!(!report.success());
    let failures: Vec<_> = report.unit_failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0],
        UnitError::Parse { file, line: 1, .. } if file == "B.zs"
    ));
    assert_eq!(*emitted.lock(), vec!["null"]);
}

#[test]
fn test_parse_failure_keeps_later_units() {
    let (backend, emitted) = backend();
    let tweaker = Tweaker::new(backend, BuildSettings::new());
    let source = MemorySource::new().with_text_group(
        "g",
        [
            ("one.zs", "global total = 1;"),
            ("two.zs", "global broken = ;"),
            ("three.zs", "emit(total);"),
        ],
    );

    let report = tweaker.load(&source).unwrap();

    assert_eq!(
        report.messages(),
        vec!["Error parsing two.zs:1 -- Unexpected token: Semicolon"]
    );
    assert_eq!(report.groups_built, 1);
    assert_eq!(*emitted.lock(), vec!["1"]);
}

#[test]
fn test_debug_directive_reports_lines() {
    let (backend, _) = backend();
    let tweaker = Tweaker::new(backend, BuildSettings::new());
    let source = MemorySource::new()
        .with_text_group("debug.zs", [("debug.zs", "#debug\nvar x = 1;\nemit(x * 'two');")])
        .with_text_group("plain.zs", [("plain.zs", "var x = 1;\nemit(x * 'two');")]);

    let report = tweaker.load(&source).unwrap();

    assert_eq!(
        report.messages(),
        vec![
            "Error executing debug.zs: Runtime error: Cannot apply * to number and string (at debug.zs:3)",
            "Error executing plain.zs: Runtime error: Cannot apply * to number and string (at plain.zs)",
        ]
    );
}

#[test]
fn test_directory_source_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("main.zs"), "emit('main');").unwrap();
    fs::create_dir(root.join("mods")).unwrap();
    fs::write(root.join("mods/a.zs"), "global greeting = 'hello';").unwrap();
    fs::write(root.join("mods/b.zs"), "emit(greeting ~ ' ' ~ <item:minecraft:stone>);").unwrap();
    fs::write(root.join("mods/c.zs"), "#norun\nthis is not a script").unwrap();

    let (backend, emitted) = backend();
    let tweaker = Tweaker::new(backend, BuildSettings::new());
    let report = tweaker.load(&DirectorySource::new(root)).unwrap();

    assert!(report.success(), "{:?}", report.messages());
    assert_eq!(report.groups_built, 2);
    assert_eq!(report.units_skipped, 1);
    assert_eq!(*emitted.lock(), vec!["main", "hello item:minecraft:stone"]);
}

#[test]
fn test_deeply_nested_unit_fails_alone() {
    let depth = 200_000;
    let nested = format!("var x = {}1{};", "(".repeat(depth), ")".repeat(depth));

    let (backend, emitted) = backend();
    let tweaker = Tweaker::new(backend, BuildSettings::new());
    let source = MemorySource::new()
        .with_text_group("deep.zs", [("deep.zs", nested.as_str())])
        .with_text_group("after.zs", [("after.zs", "emit('after');")]);

    let report = tweaker.load(&source).unwrap();

    assert_eq!(
        report.messages(),
        vec!["Error parsing deep.zs:1 -- Script nested too deeply"]
    );
    assert_eq!(report.groups_built, 2);
    assert_eq!(*emitted.lock(), vec!["after"]);
}
