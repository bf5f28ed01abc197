use std::collections::HashSet;

use crate::db::{Batch, BatchSummary, EntityStore, StoreResult};
use crate::events::{EventKind, Reporter};
use crate::model::{EntityType, Side};

use super::stage_match;

/// True when `symbol` holds `name` followed (somewhere later) by
/// `function_symbol`, the layout MSVC uses for a function-local static:
/// `?g_startupDelay@?1??Tick@IsleApp@@QAEXH@Z@4HA`.
fn static_symbol_matches(symbol: &str, name: &str, function_symbol: &str) -> bool {
    symbol.match_indices(name).any(|(pos, _)| symbol[pos + name.len()..].contains(function_symbol))
}

/// Match function-local static variables through the mangled symbol of the
/// function that encloses them.
///
/// Needs the parent function's `symbol`, so run it after symbol and
/// function matching.
pub fn match_static_variables(
    store: &mut EntityStore,
    reporter: &mut dyn Reporter,
) -> StoreResult<BatchSummary> {
    let mut claimed: HashSet<u64> = HashSet::new();
    let mut batch = Batch::new();

    for var in store.unmatched(Side::Orig) {
        if var.attrs.static_var != Some(true) {
            continue;
        }
        let (Some(var_addr), Some(var_name)) = (var.orig_addr(), var.name()) else {
            continue;
        };

        let parent = var.attrs.parent_function.and_then(|addr| store.get_by_orig(addr, true));
        let Some(function_symbol) = parent.and_then(|f| f.attrs.symbol.as_deref()) else {
            reporter.report(
                EventKind::NoMatch,
                var_addr,
                &format!("No function for static variable '{var_name}'"),
            );
            continue;
        };

        let found = store
            .unmatched(Side::Recomp)
            .filter(|e| matches!(e.entity_type(), None | Some(EntityType::Data)))
            .filter_map(|e| Some((e.recomp_addr()?, e.attrs.symbol.as_deref()?)))
            .find(|(addr, symbol)| {
                !claimed.contains(addr) && static_symbol_matches(symbol, var_name, function_symbol)
            })
            .map(|(addr, _)| addr);

        match found {
            Some(recomp_addr) => {
                claimed.insert(recomp_addr);
                stage_match(&mut batch, var_addr, recomp_addr, reporter);
            }
            None => {
                let function_name = parent.and_then(|f| f.name()).unwrap_or("<unnamed>");
                reporter.report(
                    EventKind::NoMatch,
                    var_addr,
                    &format!(
                        "Failed to match static variable {var_name} from function {function_name} annotated with 0x{var_addr:x}"
                    ),
                );
            }
        }
    }

    batch.apply(store)
}
