use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::events::{EventKind, Reporter};
use crate::model::{EntityType, Side};

use super::{stage_match, AddressIndex};

/// Recomp name of the plain vtable of `class`.
pub fn bare_vftable_name(class: &str) -> String {
    format!("{class}::`vftable'")
}

/// Recomp name of the vtable `class` carries for base `base`.
pub fn for_vftable_name(class: &str, base: &str) -> String {
    format!("{class}::`vftable'{{for `{base}'}}")
}

/// Match VTABLE entities: orig side carries the class name (and optionally
/// `base_class`), recomp side carries the MSVC vftable name.
///
/// Without a distinct base class the bare vtable name is tried first, then
/// the `{for ...}` form.
pub fn match_vtables(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
) -> StoreResult<BatchSummary> {
    let mut index = AddressIndex::default();
    for entity in store.unmatched(Side::Recomp) {
        if entity.entity_type() != Some(EntityType::Vtable) {
            continue;
        }
        if let (Some(addr), Some(name)) = (entity.recomp_addr(), entity.name()) {
            index.add(name.to_owned(), addr);
        }
    }

    let mut batch = Batch::new();
    for entity in store.unmatched(Side::Orig) {
        if entity.entity_type() != Some(EntityType::Vtable) {
            continue;
        }
        let (Some(orig_addr), Some(class_name)) = (entity.orig_addr(), entity.name()) else {
            continue;
        };
        let base_class = entity.attrs.base_class.as_deref();

        let mut recomp_addr = None;
        if base_class.map_or(true, |base| base == class_name) {
            recomp_addr = index.pop(&bare_vftable_name(class_name));
        }
        if recomp_addr.is_none() {
            let for_name = base_class.unwrap_or(class_name);
            recomp_addr = index.pop(&for_vftable_name(class_name, for_name));
        }

        match recomp_addr {
            Some(recomp_addr) => stage_match(&mut batch, orig_addr, recomp_addr, reporter),
            None => reporter.report(
                EventKind::NoMatch,
                orig_addr,
                &format!(
                    "Failed to match vtable at 0x{orig_addr:x} for class '{class_name}' (base={})",
                    base_class.unwrap_or("None")
                ),
            ),
        }
    }

    batch.apply(store)
}
