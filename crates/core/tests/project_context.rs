use std::path::Path;

use correlate_core::backends::MemoryImage;
use correlate_core::db::{LinesDb, ProjectConfig, ProjectContext, ProjectLayout, RunStatus};
use correlate_core::events::EventKind;
use correlate_core::model::{Entity, EntityType};
use correlate_core::services::{
    CorrelationRunner, IngestBundle, IngestError, RunInputs, RunRequest,
};

fn init_project(root: &Path, source_dirs: Vec<String>) -> ProjectLayout {
    let layout = ProjectLayout::new(root);
    std::fs::create_dir_all(&layout.meta_dir).unwrap();
    let mut config = ProjectConfig::new("CtxProject", layout.db_path_relative_string());
    config.source_dirs = source_dirs;
    std::fs::write(&layout.project_config_path, serde_json::to_string_pretty(&config).unwrap())
        .unwrap();
    layout
}

const BUNDLE_YAML: &str = r#"
orig:
  - { address: 0x1000, type: function, name: Tick, symbol: "?Tick@@YAXXZ" }
  - { address: 0x1100, type: function, name: Missing, symbol: "?Missing@@YAXXZ" }
  - { address: 0x2000, type: string }
  - { address: 0x2300, type: line, filename: "src/game.cpp", line: 9 }
recomp:
  - { address: 0x5000, symbol: "?Tick@@YAXXZ" }
  - { address: 0x7000, type: string }
lines:
  files:
    - path: 'C:\build\src\game.cpp'
      lines: [[10, 0x9000]]
  function_starts: [0x9000]
strings:
  - { address: 0x2000, text: "Hi" }
"#;

#[test]
fn project_context_loads_config_and_db() {
    let temp = tempfile::tempdir().unwrap();
    init_project(temp.path(), Vec::new());

    let ctx = ProjectContext::from_root(temp.path()).expect("context");
    assert_eq!(ctx.config.name, "CtxProject");
    assert!(ctx.db_path.is_file());
    assert!(ctx.config.matching.truncate_symbols);
    assert!(ctx.saved_store().expect("saved store").is_empty());
}

#[test]
fn missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = ProjectContext::from_root(temp.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to read project config"));
}

#[test]
fn source_dirs_are_walked_recursively() {
    let temp = tempfile::tempdir().unwrap();
    let nested = temp.path().join("src").join("sub");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(temp.path().join("src").join("game.cpp"), "").unwrap();
    std::fs::write(nested.join("util.cpp"), "").unwrap();
    init_project(temp.path(), vec!["src".into(), "absent".into()]);

    let ctx = ProjectContext::from_root(temp.path()).expect("context");
    let files = ctx.source_files();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.ends_with("game.cpp")));
    assert!(files.iter().any(|f| f.ends_with("util.cpp")));
}

#[cfg(unix)]
#[test]
fn symlink_loops_are_not_followed() {
    let temp = tempfile::tempdir().unwrap();
    let src = temp.path().join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("a.cpp"), "").unwrap();
    std::os::unix::fs::symlink(&src, src.join("loop")).unwrap();
    init_project(temp.path(), vec!["src".into()]);

    let ctx = ProjectContext::from_root(temp.path()).expect("context");
    let files = ctx.source_files();
    assert_eq!(files.len(), 1);

    let mut lines = LinesDb::new(files);
    assert!(lines.add_lines("C:\\build\\src\\a.cpp", [(15, 0x200)]));
}

#[test]
fn overlapping_source_dirs_list_each_file_once() {
    let temp = tempfile::tempdir().unwrap();
    let nested = temp.path().join("src").join("sub");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("util.cpp"), "").unwrap();
    init_project(temp.path(), vec!["src".into(), "src/sub".into()]);

    let ctx = ProjectContext::from_root(temp.path()).expect("context");
    assert_eq!(ctx.source_files().len(), 1);
}

#[test]
fn bundles_load_from_yaml_and_json() {
    let temp = tempfile::tempdir().unwrap();
    let yaml_path = temp.path().join("bundle.yaml");
    std::fs::write(&yaml_path, BUNDLE_YAML).unwrap();
    let bundle = IngestBundle::load(&yaml_path).expect("yaml bundle");
    assert_eq!(bundle.orig.len(), 4);
    assert_eq!(bundle.orig[0].entity_type, Some(EntityType::Function));
    assert_eq!(bundle.strings.len(), 1);

    let json_path = temp.path().join("bundle.json");
    std::fs::write(&json_path, serde_json::to_string(&bundle).unwrap()).unwrap();
    assert_eq!(IngestBundle::load(&json_path).expect("json bundle"), bundle);

    let bad_path = temp.path().join("bad.json");
    std::fs::write(&bad_path, "{").unwrap();
    assert!(matches!(IngestBundle::load(&bad_path), Err(IngestError::Json(_))));
    assert!(matches!(
        IngestBundle::load(&temp.path().join("absent.yaml")),
        Err(IngestError::Io { .. })
    ));
}

#[test]
fn runner_matches_verifies_and_records_the_run() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src").join("game.cpp"), "").unwrap();
    init_project(temp.path(), vec!["src".into()]);
    let ctx = ProjectContext::from_root(temp.path()).expect("context");

    let bundle: IngestBundle = serde_yaml::from_str(BUNDLE_YAML).unwrap();
    let orig = MemoryImage::new().with_blob(0x2000, b"Hi\0".to_vec());
    let recomp = MemoryImage::new().with_blob(0x7000, b"Hi\0".to_vec());
    let request = RunRequest {
        label: "first".into(),
        input_hash: "abc".into(),
        ..RunRequest::default()
    };
    let inputs = RunInputs { bundle: &bundle, orig_image: Some(&orig), recomp_image: Some(&recomp) };

    let outcome = CorrelationRunner::new(&ctx).run(&request, inputs).expect("run");
    assert_eq!(outcome.string_mismatches, 0);
    assert!(outcome.vtable_warnings.is_empty());
    // Tick by symbol, the string by bytes, the line through the source tree.
    assert_eq!(outcome.matched, 3);
    assert_eq!(outcome.report.linked(), 3);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].kind, EventKind::NoMatch);
    assert_eq!(outcome.events[0].address, 0x1100);

    let saved = ctx.saved_store().expect("saved store");
    assert_eq!(saved.get_one_match(0x1000).and_then(Entity::recomp_addr), Some(0x5000));
    assert_eq!(saved.get_one_match(0x2300).and_then(Entity::recomp_addr), Some(0x9000));
    assert_eq!(saved.get_one_match(0x2000).and_then(Entity::name), Some("\"Hi\""));

    let runs = ctx.db.list_runs().expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, outcome.run_id);
    assert_eq!(runs[0].record.status, RunStatus::Succeeded);
    assert_eq!(runs[0].record.matched, 3);
    assert_eq!(runs[0].record.events, 1);
    assert_eq!(ctx.db.list_events(outcome.run_id).expect("events"), outcome.events);
}

#[test]
fn runner_without_images_skips_verification() {
    let temp = tempfile::tempdir().unwrap();
    init_project(temp.path(), Vec::new());
    let ctx = ProjectContext::from_root(temp.path()).expect("context");

    let bundle: IngestBundle = serde_yaml::from_str(BUNDLE_YAML).unwrap();
    let inputs = RunInputs { bundle: &bundle, orig_image: None, recomp_image: None };
    let outcome = CorrelationRunner::new(&ctx).run(&RunRequest::default(), inputs).expect("run");
    assert_eq!(outcome.string_mismatches, 0);
    // Without the source tree the line annotation cannot resolve.
    assert!(ctx.saved_store().expect("saved").get_one_match(0x2300).is_none());
    assert_eq!(ctx.db.run_count().expect("count"), 1);
}
