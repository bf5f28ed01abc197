use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::events::{EventKind, Reporter};
use crate::model::Side;

use super::{stage_match, truncate_name, AddressIndex};

/// Match unmatched entities whose `symbol` is identical on both sides.
///
/// Symbols are expected to be unique. When several recomp entities share a
/// symbol they are handed out lowest address first and the orig entity is
/// reported as `NON_UNIQUE_SYMBOL`.
pub fn match_symbols(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
    truncate: bool,
) -> StoreResult<BatchSummary> {
    let mut index = AddressIndex::default();
    for entity in store.unmatched(Side::Recomp) {
        if let (Some(addr), Some(symbol)) = (entity.recomp_addr(), entity.attrs.symbol.as_deref())
        {
            index.add(truncate_name(symbol, truncate), addr);
        }
    }

    let mut batch = Batch::new();
    for entity in store.unmatched(Side::Orig) {
        let (Some(orig_addr), Some(symbol)) = (entity.orig_addr(), entity.attrs.symbol.as_deref())
        else {
            continue;
        };
        let symbol = truncate_name(symbol, truncate);

        match index.pop(&symbol) {
            Some(recomp_addr) => {
                if index.contains(&symbol) {
                    reporter.report(
                        EventKind::NonUniqueSymbol,
                        orig_addr,
                        &format!("Matched 0x{orig_addr:x} using non-unique symbol '{symbol}'"),
                    );
                }
                stage_match(&mut batch, orig_addr, recomp_addr, reporter);
            }
            None => reporter.report(
                EventKind::NoMatch,
                orig_addr,
                &format!("Failed to match at 0x{orig_addr:x} with symbol '{symbol}'"),
            ),
        }
    }

    batch.apply(store)
}
