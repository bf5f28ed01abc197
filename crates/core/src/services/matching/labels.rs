//! Positional matching by name.

use serde::Serialize;

use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::events::{EventKind, Reporter};
use crate::model::{Entity, EntityType, Side};

use super::{pair_by_occurrence, stage_match, truncate_name};

/// One pairing proposed by [`get_matches_for_type_and_label`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelMatch {
    pub orig_addr: u64,
    pub recomp_addr: u64,
    pub label: String,
    /// Both sides had exactly one candidate with this label.
    pub is_unique: bool,
}

type LabelKey = (String, Option<EntityType>);

fn candidates(
    store: &EntityStore,
    side: Side,
    entity_type: Option<EntityType>,
    truncate: bool,
) -> Vec<(LabelKey, u64)> {
    store
        .unmatched(side)
        .filter_map(|e| {
            let name = e.name()?;
            let addr = e.addr(side)?;
            let key = match entity_type {
                Some(t) if e.entity_type().map_or(true, |own| own == t) => {
                    (truncate_name(name, truncate), None)
                }
                Some(_) => return None,
                None => (truncate_name(name, truncate), e.entity_type()),
            };
            Some((key, addr))
        })
        .collect()
}

/// Pair unmatched entities by name and occurrence.
///
/// With `Some(t)`, candidates on each side are entities named and either
/// untyped or of type `t`; a pairing needs at least one side typed. With
/// `None`, entities are grouped by exact (name, type). Within a group the
/// k-th lowest orig address pairs with the k-th lowest recomp address.
pub fn get_matches_for_type_and_label(
    store: &EntityStore,
    entity_type: Option<EntityType>,
    truncate: bool,
) -> Vec<LabelMatch> {
    let pairing = pair_by_occurrence(
        candidates(store, Side::Orig, entity_type, truncate),
        candidates(store, Side::Recomp, entity_type, truncate),
    );

    let typed = |e: Option<&Entity>| e.and_then(Entity::entity_type).is_some();
    pairing
        .pairs
        .into_iter()
        .filter(|p| {
            entity_type.is_none()
                || typed(store.get_by_orig(p.orig, true))
                || typed(store.get_by_recomp(p.recomp, true))
        })
        .map(|p| LabelMatch {
            orig_addr: p.orig,
            recomp_addr: p.recomp,
            label: p.key.0,
            is_unique: p.unique,
        })
        .collect()
}

/// Match FUNCTION entities by name. Non-unique names still match but are
/// reported as `AMBIGUOUS_MATCH`.
pub fn match_functions(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
    truncate: bool,
) -> StoreResult<BatchSummary> {
    let mut batch = Batch::new();
    for found in get_matches_for_type_and_label(store, Some(EntityType::Function), truncate) {
        if !found.is_unique {
            reporter.report(
                EventKind::AmbiguousMatch,
                found.orig_addr,
                &format!("Ambiguous match 0x{:x} on name '{}'", found.orig_addr, found.label),
            );
        }
        stage_match(&mut batch, found.orig_addr, found.recomp_addr, reporter);
    }
    batch.apply(store)
}

fn is_variable_type(entity_type: Option<EntityType>) -> bool {
    matches!(entity_type, Some(EntityType::Data) | Some(EntityType::Pointer))
}

/// Match non-static DATA/POINTER variables by name and occurrence.
///
/// Orig entities must be typed; recomp entities may be untyped since debug
/// info does not always say what a symbol is.
pub fn match_variables(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
) -> StoreResult<BatchSummary> {
    let orig: Vec<(String, u64)> = store
        .unmatched(Side::Orig)
        .filter(|e| is_variable_type(e.entity_type()) && e.attrs.static_var != Some(true))
        .filter_map(|e| Some((e.name()?.to_owned(), e.orig_addr()?)))
        .collect();
    let recomp: Vec<(String, u64)> = store
        .unmatched(Side::Recomp)
        .filter(|e| e.entity_type().is_none() || is_variable_type(e.entity_type()))
        .filter_map(|e| Some((e.name()?.to_owned(), e.recomp_addr()?)))
        .collect();

    let pairing = pair_by_occurrence(orig, recomp);
    let mut batch = Batch::new();
    for pair in pairing.pairs {
        if !pair.unique {
            reporter.report(
                EventKind::AmbiguousMatch,
                pair.orig,
                &format!("Ambiguous match 0x{:x} on variable '{}'", pair.orig, pair.key),
            );
        }
        stage_match(&mut batch, pair.orig, pair.recomp, reporter);
    }
    for (name, addr) in pairing.unpaired_orig {
        reporter.report(
            EventKind::NoMatch,
            addr,
            &format!("Failed to match variable {name} at 0x{addr:x}"),
        );
    }
    batch.apply(store)
}
