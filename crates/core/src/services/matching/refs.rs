use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::events::Reporter;
use crate::model::Side;

use super::{pair_by_occurrence, stage_match};

/// Match entities that point at the same matched parent through
/// `ref_orig` / `ref_recomp` (thunks, for example).
///
/// Referencers are ranked by address per parent; the k-th orig referencer
/// pairs with the k-th recomp referencer. Run this after every other pass so
/// the parents are already matched.
pub fn match_ref(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
) -> StoreResult<BatchSummary> {
    // Parents are keyed by their orig address, which only matched parents
    // have on both sides.
    let orig: Vec<(u64, u64)> = store
        .unmatched(Side::Orig)
        .filter_map(|e| {
            let parent = store.get_by_orig(e.attrs.ref_orig?, true).filter(|p| p.matched())?;
            Some((parent.orig_addr()?, e.orig_addr()?))
        })
        .collect();
    let recomp: Vec<(u64, u64)> = store
        .unmatched(Side::Recomp)
        .filter_map(|e| {
            let parent = store.get_by_recomp(e.attrs.ref_recomp?, true)?;
            Some((parent.orig_addr()?, e.recomp_addr()?))
        })
        .collect();

    let pairing = pair_by_occurrence(orig, recomp);
    let mut batch = Batch::new();
    for pair in pairing.pairs {
        stage_match(&mut batch, pair.orig, pair.recomp, reporter);
    }
    batch.apply(store)
}
