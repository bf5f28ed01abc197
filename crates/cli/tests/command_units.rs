use std::fs;
use std::path::Path;

use correlate_core::db::{ProjectContext, RunStatus};
use correlate_core::model::Entity;
use recomp_correlate::commands::{
    correlate_command, fmt_addr, init_project_command, list_events_command, list_matches_command,
    list_runs_command, project_info_command, show_entity_command, CorrelateArgs,
};
use tempfile::tempdir;

const BUNDLE_JSON: &str = r#"{
  "orig": [
    {"address": 4096, "type": "vtable", "name": "Widget", "size": 8},
    {"address": 4352, "type": "data", "name": "g_count"}
  ],
  "recomp": [
    {"address": 8192, "type": "vtable", "name": "Widget::`vftable'", "size": 8},
    {"address": 8448, "name": "g_count"}
  ]
}"#;

fn root_str(path: &Path) -> &str {
    path.to_str().expect("utf8 temp path")
}

fn write_bundle(root: &Path) -> String {
    let path = root.join("inputs.json");
    fs::write(&path, BUNDLE_JSON).expect("write bundle");
    path.to_string_lossy().to_string()
}

#[test]
fn init_then_info_round_trip() {
    let dir = tempdir().expect("tempdir");
    let root = root_str(dir.path());
    init_project_command(root, None).expect("init");
    project_info_command(root, false).expect("info");
    project_info_command(root, true).expect("info json");

    let ctx = ProjectContext::from_root(dir.path()).expect("context");
    let expected = dir.path().file_name().and_then(|n| n.to_str()).expect("dir name");
    assert_eq!(ctx.config.name, expected);
}

#[test]
fn correlate_command_saves_matches_for_the_listing_commands() {
    let dir = tempdir().expect("tempdir");
    let root = root_str(dir.path());
    init_project_command(root, Some("Units".into())).expect("init");

    let args = CorrelateArgs {
        input: write_bundle(dir.path()),
        label: Some("vtables-and-data".into()),
        ..CorrelateArgs::default()
    };
    let outcome = correlate_command(root, &args, false).expect("correlate");
    assert_eq!(outcome.matched, 2);
    assert!(outcome.events.is_empty());
    assert!(outcome.vtable_warnings.is_empty());

    let ctx = ProjectContext::from_root(dir.path()).expect("context");
    let store = ctx.saved_store().expect("saved store");
    assert_eq!(store.get_one_match(0x1000).and_then(Entity::recomp_addr), Some(0x2000));
    assert_eq!(store.get_one_match(0x1100).and_then(Entity::recomp_addr), Some(0x2100));

    let runs = ctx.db.list_runs().expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].record.label, "vtables-and-data");
    assert_eq!(runs[0].record.status, RunStatus::Succeeded);
    assert_eq!(runs[0].record.input_hash.len(), 64);
    assert!(runs[0].record.orig_image_hash.is_none());

    list_matches_command(root, None, false).expect("list matches");
    list_matches_command(root, Some("vtable"), true).expect("list vtables");
    list_runs_command(root, true).expect("list runs");
    list_events_command(root, outcome.run_id, false).expect("list events");
    show_entity_command(root, None, Some("0x2100"), false, false).expect("show recomp");
}

#[test]
fn correlate_command_needs_an_existing_image() {
    let dir = tempdir().expect("tempdir");
    let root = root_str(dir.path());
    init_project_command(root, None).expect("init");

    let args = CorrelateArgs {
        input: write_bundle(dir.path()),
        orig_image: Some(dir.path().join("missing.exe").to_string_lossy().to_string()),
        ..CorrelateArgs::default()
    };
    let err = correlate_command(root, &args, false).unwrap_err();
    assert!(err.to_string().contains("Failed to open image"));
    assert_eq!(ProjectContext::from_root(dir.path()).expect("context").db.run_count().unwrap(), 0);
}

#[test]
fn show_entity_validates_its_arguments() {
    let dir = tempdir().expect("tempdir");
    let root = root_str(dir.path());
    init_project_command(root, None).expect("init");

    assert!(show_entity_command(root, Some("1"), Some("2"), false, false).is_err());
    assert!(show_entity_command(root, None, None, false, false).is_err());
    let err = show_entity_command(root, Some("zz"), None, false, false).unwrap_err();
    assert!(err.to_string().contains("Invalid address: zz"));
    let err = show_entity_command(root, Some("0x10"), None, false, false).unwrap_err();
    assert!(err.to_string().contains("No orig entity at 0x10"));
}

#[test]
fn listing_an_empty_project_succeeds() {
    let dir = tempdir().expect("tempdir");
    let root = root_str(dir.path());
    init_project_command(root, None).expect("init");
    list_matches_command(root, None, false).expect("list matches");
    list_runs_command(root, false).expect("list runs");
    list_events_command(root, 42, true).expect("list events");
}

#[test]
fn fmt_addr_renders_missing_addresses() {
    assert_eq!(fmt_addr(Some(0x1000)), "0x1000");
    assert_eq!(fmt_addr(None), "-");
}
