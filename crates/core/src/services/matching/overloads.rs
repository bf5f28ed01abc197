use std::collections::HashMap;

use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::model::{EntityAttrs, EntityType};

/// Give overloaded FUNCTION entities distinct display names.
///
/// Functions sharing a `name` get `computed_name = "<name>(<n>)"`, numbered
/// from 1 in orig-address order (orig-less entities last). Thunks keep their
/// names.
pub fn name_overloaded_functions(store: &mut EntityStore) -> StoreResult<BatchSummary> {
    let mut groups: HashMap<&str, Vec<(Option<u64>, Option<u64>)>> = HashMap::new();
    for entity in store.get_all() {
        if entity.entity_type() != Some(EntityType::Function) {
            continue;
        }
        let Some(name) = entity.name() else {
            continue;
        };
        if name.contains("Thunk of") {
            continue;
        }
        groups.entry(name).or_default().push((entity.orig_addr(), entity.recomp_addr()));
    }

    let mut batch = Batch::new();
    for (name, members) in groups {
        if members.len() < 2 {
            continue;
        }
        for (nth, (orig, recomp)) in members.into_iter().enumerate() {
            let attrs = EntityAttrs {
                computed_name: Some(format!("{name}({})", nth + 1)),
                ..EntityAttrs::default()
            };
            match (orig, recomp) {
                (Some(orig), _) => batch.set_orig(orig, attrs),
                (None, Some(recomp)) => batch.set_recomp(recomp, attrs),
                (None, None) => {}
            }
        }
    }
    batch.apply(store)
}
