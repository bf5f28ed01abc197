use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::events::Reporter;
use crate::model::{Entity, Side};

use super::{pair_by_occurrence, stage_match};

type StringKey = (bool, Vec<u8>);

fn string_candidates(store: &EntityStore, side: Side) -> Vec<(StringKey, u64)> {
    store
        .unmatched(side)
        .filter(|e| e.entity_type().is_some_and(|t| t.is_string()))
        .filter_map(|e: &Entity| {
            let addr = e.addr(side)?;
            let raw = store.raw_bytes(side, addr)?;
            Some(((e.attrs.is_wide(), raw.to_vec()), addr))
        })
        .collect()
}

/// Match string entities with identical raw bytes. Duplicate literals pair
/// up by address order. Bytes must already be loaded with
/// [`EntityStore::read_strings`].
pub fn match_strings(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
) -> StoreResult<BatchSummary> {
    let pairing = pair_by_occurrence(
        string_candidates(store, Side::Orig),
        string_candidates(store, Side::Recomp),
    );

    let mut batch = Batch::new();
    for pair in pairing.pairs {
        stage_match(&mut batch, pair.orig, pair.recomp, reporter);
    }
    batch.apply(store)
}
