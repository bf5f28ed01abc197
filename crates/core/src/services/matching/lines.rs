use std::collections::HashSet;

use crate::db::{Batch, BatchSummary, EntityStore, LinesDb, StoreResult};
use crate::events::{EventKind, Reporter};
use crate::model::{EntityType, Side};

/// Give unmatched LINE annotations the recomp address of the function
/// starting right below them.
///
/// The annotation comment sits on `line`, so the code it marks is looked up
/// at `line + 1`.
pub fn match_lines(
    store: &mut EntityStore,
    lines: &LinesDb,
    reporter: &mut dyn Reporter,
) -> StoreResult<BatchSummary> {
    let mut claimed: HashSet<u64> = HashSet::new();
    let mut batch = Batch::new();

    for entity in store.unmatched(Side::Orig) {
        if entity.entity_type() != Some(EntityType::Line) {
            continue;
        }
        let Some(orig_addr) = entity.orig_addr() else {
            continue;
        };
        let (Some(filename), Some(line)) = (entity.attrs.filename.as_deref(), entity.attrs.line)
        else {
            tracing::debug!(orig = format!("{orig_addr:#x}"), "LINE entity without a location");
            continue;
        };

        match lines.search_line(filename, line.saturating_add(1), None) {
            Some(recomp_addr)
                if claimed.contains(&recomp_addr)
                    || store.get_by_recomp(recomp_addr, true).is_some() =>
            {
                reporter.report(
                    EventKind::NoMatch,
                    orig_addr,
                    &format!(
                        "Debug symbol 0x{recomp_addr:x} for {filename}:{line} already belongs to another entity"
                    ),
                );
            }
            Some(recomp_addr) => {
                claimed.insert(recomp_addr);
                batch.set_recomp_addr(orig_addr, recomp_addr);
            }
            None => reporter.report(
                EventKind::NoMatch,
                orig_addr,
                &format!("Found no matching debug symbol for {filename}:{line}"),
            ),
        }
    }

    batch.apply(store)
}
