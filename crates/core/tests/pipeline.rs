use correlate_core::backends::MemoryImage;
use correlate_core::db::{EntityStore, LinesDb};
use correlate_core::events::EventLog;
use correlate_core::model::{Entity, EntityAttrs, EntityType, Side};
use correlate_core::services::{CorrelationPipeline, MatchOptions};

fn typed(entity_type: EntityType, name: &str) -> EntityAttrs {
    EntityAttrs::new().with_type(entity_type).with_name(name)
}

/// One entity pair for every pass.
fn populated_store() -> EntityStore {
    let mut store = EntityStore::new();

    store.set_orig_symbol(
        0x1000,
        &typed(EntityType::Function, "IsleApp::Tick").with_symbol("?Tick@IsleApp@@QAEXH@Z"),
    );
    store.set_recomp_symbol(0x5000, &EntityAttrs::new().with_symbol("?Tick@IsleApp@@QAEXH@Z"));

    store.set_orig_symbol(0x1100, &typed(EntityType::Function, "Draw"));
    store.set_recomp_symbol(0x5100, &EntityAttrs::new().with_name("Draw"));

    store.set_orig_symbol(0x2000, &typed(EntityType::Vtable, "Widget"));
    store.set_recomp_symbol(0x7000, &typed(EntityType::Vtable, "Widget::`vftable'"));

    store.set_orig_symbol(
        0x2050,
        &EntityAttrs {
            static_var: Some(true),
            parent_function: Some(0x1000),
            ..typed(EntityType::Data, "g_startupDelay")
        },
    );
    store.set_recomp_symbol(
        0x7050,
        &EntityAttrs::new().with_symbol("?g_startupDelay@?1??Tick@IsleApp@@QAEXH@Z@4HA"),
    );

    store.set_orig_symbol(0x2100, &typed(EntityType::Data, "g_count"));
    store.set_recomp_symbol(0x7100, &EntityAttrs::new().with_name("g_count"));

    store.set_orig_symbol(0x2200, &EntityAttrs::new().with_type(EntityType::String));
    store.set_recomp_symbol(0x7200, &EntityAttrs::new().with_type(EntityType::String));
    store.read_strings(Side::Orig, &MemoryImage::new().with_blob(0x2200, b"Hi\0".to_vec()));
    store.read_strings(Side::Recomp, &MemoryImage::new().with_blob(0x7200, b"Hi\0".to_vec()));

    store.set_orig_symbol(
        0x2300,
        &EntityAttrs {
            entity_type: Some(EntityType::Line),
            filename: Some("a.cpp".into()),
            line: Some(14),
            ..EntityAttrs::default()
        },
    );

    store.set_orig_symbol(0x2400, &EntityAttrs { ref_orig: Some(0x1100), ..EntityAttrs::default() });
    store.set_recomp_symbol(
        0x8100,
        &EntityAttrs { ref_recomp: Some(0x5100), ..EntityAttrs::default() },
    );

    store
}

fn lines() -> LinesDb {
    let mut lines = LinesDb::new(["a.cpp"]);
    lines.add_lines("a.cpp", [(15, 0x8000)]);
    lines.add_function_starts([0x8000]);
    lines
}

#[test]
fn pipeline_runs_every_pass_in_order() {
    let mut store = populated_store();
    let lines = lines();
    let mut log = EventLog::new();

    let report = CorrelationPipeline::default()
        .run(&mut store, Some(&lines), &mut log)
        .expect("pipeline");

    let order: Vec<&str> = report.passes.iter().map(|p| p.pass).collect();
    assert_eq!(
        order,
        vec![
            "symbols",
            "functions",
            "vtables",
            "static_variables",
            "variables",
            "strings",
            "lines",
            "ref",
            "overloads"
        ]
    );
    for pass in &report.passes[..8] {
        assert_eq!(pass.summary.matched + pass.summary.recomp_assigned, 1, "{}", pass.pass);
    }
    assert_eq!(report.linked(), 8);
    assert!(log.is_empty(), "unexpected events: {:?}", log.events());

    for (orig, recomp) in [
        (0x1000, 0x5000),
        (0x1100, 0x5100),
        (0x2000, 0x7000),
        (0x2050, 0x7050),
        (0x2100, 0x7100),
        (0x2200, 0x7200),
        (0x2300, 0x8000),
        (0x2400, 0x8100),
    ] {
        assert_eq!(
            store.get_one_match(orig).and_then(Entity::recomp_addr),
            Some(recomp),
            "orig {orig:#x}"
        );
    }
}

#[test]
fn second_run_changes_nothing() {
    let mut store = populated_store();
    let lines = lines();
    let pipeline = CorrelationPipeline::new(MatchOptions::default());

    pipeline.run(&mut store, Some(&lines), &mut EventLog::new()).expect("first run");
    let snapshot: Vec<Entity> = store.get_all().into_iter().cloned().collect();

    let mut log = EventLog::new();
    let report = pipeline.run(&mut store, Some(&lines), &mut log).expect("second run");
    assert!(report.total().is_empty());
    assert!(log.is_empty());
    let after: Vec<Entity> = store.get_all().into_iter().cloned().collect();
    assert_eq!(snapshot, after);
}

#[test]
fn line_pass_is_skipped_without_line_data() {
    let mut store = populated_store();
    let report = CorrelationPipeline::default()
        .run(&mut store, None, &mut EventLog::new())
        .expect("pipeline");
    assert!(report.passes.iter().all(|p| p.pass != "lines"));
    assert!(store.get_one_match(0x2300).is_none());
    assert_eq!(report.linked(), 7);
}
