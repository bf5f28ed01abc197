use correlate_core::backends::MemoryImage;
use correlate_core::db::{EntityStore, LinesDb};
use correlate_core::events::{EventKind, EventLog, NopReporter};
use correlate_core::model::{Entity, EntityAttrs, EntityType, Side};
use correlate_core::services::matching::{
    get_matches_for_type_and_label, match_functions, match_lines, match_ref,
    match_static_variables, match_strings, match_symbols, match_variables, match_vtables,
    name_overloaded_functions, MAX_SYMBOL_LEN,
};

fn named(name: &str) -> EntityAttrs {
    EntityAttrs::new().with_name(name)
}

fn typed(entity_type: EntityType, name: &str) -> EntityAttrs {
    EntityAttrs::new().with_type(entity_type).with_name(name)
}

fn recomp_of(store: &EntityStore, orig: u64) -> Option<u64> {
    store.get_by_orig(orig, true).and_then(Entity::recomp_addr)
}

#[test]
fn symbols_round_trip() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x1000, &EntityAttrs::new().with_symbol("FOO"));
    store.set_recomp_symbol(0x2000, &EntityAttrs::new().with_symbol("FOO"));

    let summary = match_symbols(&mut store, &mut NopReporter, true).expect("match");
    assert_eq!(summary.matched, 1);
    assert_eq!(recomp_of(&store, 0x1000), Some(0x2000));
    assert_eq!(store.get_by_recomp(0x2000, true).and_then(Entity::orig_addr), Some(0x1000));
}

#[test]
fn non_unique_symbols_hand_out_lowest_address_first() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &EntityAttrs::new().with_symbol("?Dup@@3HA"));
    store.set_orig_symbol(0x20, &EntityAttrs::new().with_symbol("?Lonely@@3HA"));
    store.set_recomp_symbol(0xa0, &EntityAttrs::new().with_symbol("?Dup@@3HA"));
    store.set_recomp_symbol(0x90, &EntityAttrs::new().with_symbol("?Dup@@3HA"));

    let mut log = EventLog::new();
    match_symbols(&mut store, &mut log, true).expect("match");

    assert_eq!(recomp_of(&store, 0x10), Some(0x90));
    assert_eq!(log.count(EventKind::NonUniqueSymbol), 1);
    assert_eq!(log.count(EventKind::NoMatch), 1);
    let no_match = log.events().iter().find(|e| e.kind == EventKind::NoMatch).expect("event");
    assert_eq!(no_match.address, 0x20);
    assert_eq!(no_match.message, "Failed to match at 0x20 with symbol '?Lonely@@3HA'");
}

#[test]
fn long_symbols_compare_on_their_prefix_when_truncating() {
    let prefix = "x".repeat(MAX_SYMBOL_LEN);
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &EntityAttrs::new().with_symbol(format!("{prefix}_orig")));
    store.set_recomp_symbol(0x90, &EntityAttrs::new().with_symbol(format!("{prefix}_recomp")));

    let mut untruncated = store.clone();
    match_symbols(&mut untruncated, &mut NopReporter, false).expect("match");
    assert_eq!(recomp_of(&untruncated, 0x10), None);

    match_symbols(&mut store, &mut NopReporter, true).expect("match");
    assert_eq!(recomp_of(&store, 0x10), Some(0x90));
}

#[test]
fn functions_tie_break_by_address_with_one_event_per_pair() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x20, &typed(EntityType::Function, "Bar"));
    store.set_orig_symbol(0x10, &typed(EntityType::Function, "Bar"));
    store.set_recomp_symbol(0xa0, &named("Bar"));
    store.set_recomp_symbol(0x90, &named("Bar"));

    let mut log = EventLog::new();
    let summary = match_functions(&mut store, &mut log, true).expect("match");
    assert_eq!(summary.matched, 2);
    assert_eq!(recomp_of(&store, 0x10), Some(0x90));
    assert_eq!(recomp_of(&store, 0x20), Some(0xa0));
    assert_eq!(log.count(EventKind::AmbiguousMatch), 2);
    assert_eq!(log.len(), 2);
}

#[test]
fn label_pairing_needs_one_typed_side() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &named("Untyped"));
    store.set_recomp_symbol(0x90, &named("Untyped"));
    store.set_orig_symbol(0x20, &typed(EntityType::Function, "Typed"));
    store.set_recomp_symbol(0xa0, &named("Typed"));
    store.set_orig_symbol(0x30, &typed(EntityType::Data, "Other"));
    store.set_recomp_symbol(0xb0, &named("Other"));

    let found = get_matches_for_type_and_label(&store, Some(EntityType::Function), true);
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].orig_addr, found[0].recomp_addr), (0x20, 0xa0));
    assert!(found[0].is_unique);
    assert_eq!(found[0].label, "Typed");

    // Without a type the grouping is by exact (name, type).
    let any: Vec<u64> = get_matches_for_type_and_label(&store, None, true)
        .into_iter()
        .map(|m| m.orig_addr)
        .collect();
    assert_eq!(any, vec![0x10]);
}

#[test]
fn vtables_prefer_the_for_base_name_when_a_base_is_set() {
    let mut store = EntityStore::new();
    let mut with_base = typed(EntityType::Vtable, "Widget");
    with_base.base_class = Some("Base".into());
    store.set_orig_symbol(0x20, &with_base);
    store.set_recomp_symbol(0x90, &typed(EntityType::Vtable, "Widget::`vftable'"));
    store.set_recomp_symbol(0xa0, &typed(EntityType::Vtable, "Widget::`vftable'{for `Base'}"));

    match_vtables(&mut store, &mut NopReporter).expect("match");
    assert_eq!(recomp_of(&store, 0x20), Some(0xa0));
    assert!(store.get_by_recomp(0x90, true).is_some_and(|e| !e.matched()));

    store.set_orig_symbol(0x10, &typed(EntityType::Vtable, "Widget"));
    match_vtables(&mut store, &mut NopReporter).expect("match");
    assert_eq!(recomp_of(&store, 0x10), Some(0x90));
}

#[test]
fn vtable_without_candidate_is_reported() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &typed(EntityType::Vtable, "Lonely"));
    let mut log = EventLog::new();
    match_vtables(&mut store, &mut log).expect("match");
    assert_eq!(log.events()[0].message, "Failed to match vtable at 0x10 for class 'Lonely' (base=None)");
}

#[test]
fn static_variables_match_through_parent_symbol() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(
        0x1000,
        &typed(EntityType::Function, "IsleApp::Tick").with_symbol("?Tick@IsleApp@@QAEXH@Z"),
    );
    let var = EntityAttrs {
        static_var: Some(true),
        parent_function: Some(0x1000),
        ..typed(EntityType::Data, "g_startupDelay")
    };
    store.set_orig_symbol(0x3000, &var);
    store.set_recomp_symbol(
        0x4000,
        &EntityAttrs::new().with_symbol("?g_startupDelay@?1??Tick@IsleApp@@QAEXH@Z@4HA"),
    );
    let orphan = EntityAttrs {
        static_var: Some(true),
        parent_function: Some(0x9999),
        ..typed(EntityType::Data, "g_orphan")
    };
    store.set_orig_symbol(0x3100, &orphan);

    let mut log = EventLog::new();
    let summary = match_static_variables(&mut store, &mut log).expect("match");
    assert_eq!(summary.matched, 1);
    assert_eq!(recomp_of(&store, 0x3000), Some(0x4000));
    assert_eq!(log.len(), 1);
    assert_eq!(log.events()[0].message, "No function for static variable 'g_orphan'");
}

#[test]
fn variables_match_by_name_and_report_leftovers() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &typed(EntityType::Data, "g_count"));
    store.set_orig_symbol(0x20, &typed(EntityType::Pointer, "g_missing"));
    store.set_recomp_symbol(0x90, &named("g_count"));

    let mut log = EventLog::new();
    match_variables(&mut store, &mut log).expect("match");
    assert_eq!(recomp_of(&store, 0x10), Some(0x90));
    assert_eq!(log.count(EventKind::NoMatch), 1);
    assert_eq!(log.events()[0].message, "Failed to match variable g_missing at 0x20");
}

#[test]
fn duplicate_strings_pair_in_address_order() {
    let mut store = EntityStore::new();
    let string = EntityAttrs::new().with_type(EntityType::String);
    for addr in [0x10, 0x20] {
        store.set_orig_symbol(addr, &string);
    }
    for addr in [0xa0, 0x90] {
        store.set_recomp_symbol(addr, &string);
    }
    let orig = MemoryImage::new().with_blob(0x10, b"Hi\0".to_vec()).with_blob(0x20, b"Hi\0".to_vec());
    let recomp =
        MemoryImage::new().with_blob(0x90, b"Hi\0".to_vec()).with_blob(0xa0, b"Hi\0".to_vec());
    assert_eq!(store.read_strings(Side::Orig, &orig), 2);
    assert_eq!(store.read_strings(Side::Recomp, &recomp), 2);

    match_strings(&mut store, &mut NopReporter).expect("match");
    assert_eq!(recomp_of(&store, 0x10), Some(0x90));
    assert_eq!(recomp_of(&store, 0x20), Some(0xa0));
}

#[test]
fn strings_of_different_width_do_not_match() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &EntityAttrs::new().with_type(EntityType::String));
    store.set_recomp_symbol(0x90, &EntityAttrs::new().with_type(EntityType::Widechar));
    let bytes = vec![b'A', 0, 0, 0];
    store.read_strings(Side::Orig, &MemoryImage::new().with_blob(0x10, bytes.clone()));
    store.read_strings(Side::Recomp, &MemoryImage::new().with_blob(0x90, bytes));

    match_strings(&mut store, &mut NopReporter).expect("match");
    assert_eq!(recomp_of(&store, 0x10), None);
}

#[test]
fn string_entities_are_named_after_their_text() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &EntityAttrs::new().with_type(EntityType::String));
    store.set_recomp_symbol(0x90, &EntityAttrs::new().with_type(EntityType::Widechar));
    store.read_strings(Side::Orig, &MemoryImage::new().with_blob(0x10, b"a\"b\n\0".to_vec()));
    store.read_strings(Side::Recomp, &MemoryImage::new().with_blob(0x90, vec![b'H', 0, b'i', 0, 0, 0]));

    store.name_strings().expect("name");
    assert_eq!(store.get_by_orig(0x10, true).and_then(Entity::name), Some("\"a\\\"b\\n\""));
    assert_eq!(store.get_by_recomp(0x90, true).and_then(Entity::name), Some("L\"Hi\""));
}

#[test]
fn lines_assign_the_function_below_the_annotation() {
    let mut lines = LinesDb::new(["a.cpp"]);
    assert!(lines.add_lines("a.cpp", [(10, 0x100), (15, 0x200)]));
    lines.add_function_starts([0x200]);

    let line = |n: u32| EntityAttrs {
        entity_type: Some(EntityType::Line),
        filename: Some("a.cpp".into()),
        line: Some(n),
        ..EntityAttrs::default()
    };
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &line(14));
    store.set_orig_symbol(0x20, &line(9));

    let mut log = EventLog::new();
    let summary = match_lines(&mut store, &lines, &mut log).expect("match");
    assert_eq!(summary.recomp_assigned, 1);
    assert_eq!(recomp_of(&store, 0x10), Some(0x200));
    assert_eq!(recomp_of(&store, 0x20), None);
    assert_eq!(log.events()[0].message, "Found no matching debug symbol for a.cpp:9");
}

#[test]
fn lines_never_claim_an_address_twice() {
    let mut lines = LinesDb::new(["a.cpp"]);
    lines.add_lines("a.cpp", [(15, 0x200)]);
    lines.add_function_starts([0x200]);

    let line = |n: u32| EntityAttrs {
        entity_type: Some(EntityType::Line),
        filename: Some("a.cpp".into()),
        line: Some(n),
        ..EntityAttrs::default()
    };
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &line(14));
    store.set_orig_symbol(0x20, &line(15));

    let mut log = EventLog::new();
    match_lines(&mut store, &lines, &mut log).expect("match");
    assert_eq!(recomp_of(&store, 0x10), Some(0x200));
    assert_eq!(log.count(EventKind::NoMatch), 1);
    assert_eq!(log.events()[0].address, 0x20);
}

#[test]
fn refs_follow_matched_parents() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &EntityAttrs::new().with_symbol("?Foo@@YAXXZ"));
    store.set_recomp_symbol(0x90, &EntityAttrs::new().with_symbol("?Foo@@YAXXZ"));
    match_symbols(&mut store, &mut NopReporter, true).expect("symbols");

    store.set_orig_symbol(0x20, &EntityAttrs { ref_orig: Some(0x10), ..named("Thunk of 'Foo'") });
    store.set_recomp_symbol(0xa0, &EntityAttrs { ref_recomp: Some(0x90), ..EntityAttrs::default() });
    // The parent of this one never matched.
    store.set_orig_symbol(0x30, &EntityAttrs { ref_orig: Some(0x50), ..EntityAttrs::default() });

    let summary = match_ref(&mut store, &mut NopReporter).expect("refs");
    assert_eq!(summary.matched, 1);
    assert_eq!(recomp_of(&store, 0x20), Some(0xa0));
    assert_eq!(recomp_of(&store, 0x30), None);
}

#[test]
fn overloaded_functions_get_numbered_names() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x20, &typed(EntityType::Function, "Draw"));
    store.set_orig_symbol(0x10, &typed(EntityType::Function, "Draw"));
    store.set_recomp_symbol(0x300, &typed(EntityType::Function, "Draw"));
    store.set_orig_symbol(0x40, &typed(EntityType::Function, "Thunk of 'Draw'"));
    store.set_orig_symbol(0x50, &typed(EntityType::Function, "Single"));

    name_overloaded_functions(&mut store).expect("name");
    let computed = |e: Option<&Entity>| e.and_then(|e| e.attrs.computed_name.clone());
    assert_eq!(computed(store.get_by_orig(0x10, true)).as_deref(), Some("Draw(1)"));
    assert_eq!(computed(store.get_by_orig(0x20, true)).as_deref(), Some("Draw(2)"));
    assert_eq!(computed(store.get_by_recomp(0x300, true)).as_deref(), Some("Draw(3)"));
    assert_eq!(computed(store.get_by_orig(0x40, true)), None);
    assert_eq!(computed(store.get_by_orig(0x50, true)), None);
    assert_eq!(
        store.get_by_orig(0x10, true).and_then(Entity::match_name).as_deref(),
        Some("Draw(1) (FUNCTION)")
    );

    assert!(name_overloaded_functions(&mut store).expect("again").is_empty());
}

#[test]
fn passes_are_idempotent() {
    let mut store = EntityStore::new();
    store.set_orig_symbol(0x10, &EntityAttrs::new().with_symbol("?A@@3HA"));
    store.set_recomp_symbol(0x90, &EntityAttrs::new().with_symbol("?A@@3HA"));
    store.set_orig_symbol(0x20, &typed(EntityType::Function, "Bar"));
    store.set_orig_symbol(0x30, &typed(EntityType::Function, "Bar"));
    store.set_recomp_symbol(0xa0, &named("Bar"));
    store.set_recomp_symbol(0xb0, &named("Bar"));
    store.set_orig_symbol(0x40, &typed(EntityType::Data, "g_var"));
    store.set_recomp_symbol(0xc0, &named("g_var"));

    assert!(!match_symbols(&mut store, &mut NopReporter, true).expect("first").is_empty());
    assert!(match_symbols(&mut store, &mut NopReporter, true).expect("second").is_empty());
    assert!(!match_functions(&mut store, &mut NopReporter, true).expect("first").is_empty());
    assert!(match_functions(&mut store, &mut NopReporter, true).expect("second").is_empty());
    assert!(!match_variables(&mut store, &mut NopReporter).expect("first").is_empty());
    assert!(match_variables(&mut store, &mut NopReporter).expect("second").is_empty());

    let snapshot: Vec<Entity> = store.get_all().into_iter().cloned().collect();
    match_vtables(&mut store, &mut NopReporter).expect("vtables");
    match_strings(&mut store, &mut NopReporter).expect("strings");
    match_ref(&mut store, &mut NopReporter).expect("refs");
    let after: Vec<Entity> = store.get_all().into_iter().cloned().collect();
    assert_eq!(snapshot, after);
}
