//! Matching passes.
//!
//! Each pass reads the store, stages its decisions in one [`Batch`], and
//! applies it. Passes only look at unmatched entities, so running one twice
//! changes nothing the second time. Anything that cannot be matched goes to
//! the [`Reporter`].

mod labels;
mod lines;
mod overloads;
mod refs;
mod statics;
mod strings;
mod symbols;
mod vtables;

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::db::Batch;
use crate::events::{EventKind, Reporter};

pub use labels::{get_matches_for_type_and_label, match_functions, match_variables, LabelMatch};
pub use lines::match_lines;
pub use overloads::name_overloaded_functions;
pub use refs::match_ref;
pub use statics::match_static_variables;
pub use strings::match_strings;
pub use symbols::match_symbols;
pub use vtables::match_vtables;

/// Longest name older MSVC linkers keep (warning C4786).
pub const MAX_SYMBOL_LEN: usize = 255;

pub(crate) fn truncate_name(name: &str, truncate: bool) -> String {
    if truncate && name.chars().count() > MAX_SYMBOL_LEN {
        name.chars().take(MAX_SYMBOL_LEN).collect()
    } else {
        name.to_owned()
    }
}

/// Name → addresses, popped in ascending address order.
#[derive(Debug, Default)]
pub(crate) struct AddressIndex {
    map: HashMap<String, VecDeque<u64>>,
}

impl AddressIndex {
    /// Addresses must be added in ascending order per key.
    pub(crate) fn add(&mut self, key: String, addr: u64) {
        self.map.entry(key).or_default().push_back(addr);
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.map.get(key).is_some_and(|addrs| !addrs.is_empty())
    }

    pub(crate) fn pop(&mut self, key: &str) -> Option<u64> {
        self.map.get_mut(key)?.pop_front()
    }
}

/// The k-th orig occurrence of a key paired with the k-th recomp occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Occurrence<K> {
    pub key: K,
    pub orig: u64,
    pub recomp: u64,
    /// Both sides had exactly one entity with this key.
    pub unique: bool,
}

#[derive(Debug)]
pub(crate) struct Pairing<K> {
    /// Sorted by orig address.
    pub pairs: Vec<Occurrence<K>>,
    /// Orig entries with no recomp partner, sorted by address.
    pub unpaired_orig: Vec<(K, u64)>,
}

fn group_sorted<K: Eq + Hash>(items: Vec<(K, u64)>) -> HashMap<K, Vec<u64>> {
    let mut groups: HashMap<K, Vec<u64>> = HashMap::new();
    for (key, addr) in items {
        groups.entry(key).or_default().push(addr);
    }
    for addrs in groups.values_mut() {
        addrs.sort_unstable();
    }
    groups
}

/// Rank each side's entries by address within their key group and pair
/// equal ranks.
pub(crate) fn pair_by_occurrence<K>(orig: Vec<(K, u64)>, recomp: Vec<(K, u64)>) -> Pairing<K>
where
    K: Eq + Hash + Clone,
{
    let orig_groups = group_sorted(orig);
    let recomp_groups = group_sorted(recomp);

    let mut pairs = Vec::new();
    let mut unpaired_orig = Vec::new();
    for (key, origs) in &orig_groups {
        let recomps = recomp_groups.get(key).map(Vec::as_slice).unwrap_or(&[]);
        let unique = origs.len() == 1 && recomps.len() == 1;
        for (nth, orig) in origs.iter().enumerate() {
            match recomps.get(nth) {
                Some(recomp) => pairs.push(Occurrence {
                    key: key.clone(),
                    orig: *orig,
                    recomp: *recomp,
                    unique,
                }),
                None => unpaired_orig.push((key.clone(), *orig)),
            }
        }
    }
    pairs.sort_by_key(|p| p.orig);
    unpaired_orig.sort_by_key(|(_, addr)| *addr);
    Pairing { pairs, unpaired_orig }
}

/// Stage a match and report any orig it pushed out of the batch.
pub(crate) fn stage_match(
    batch: &mut Batch,
    orig: u64,
    recomp: u64,
    reporter: &mut dyn Reporter,
) {
    if let Some(displaced) = batch.match_pair(orig, recomp) {
        tracing::debug!(
            displaced = format!("{displaced:#x}"),
            orig = format!("{orig:#x}"),
            recomp = format!("{recomp:#x}"),
            "Replaced staged match"
        );
        reporter.report(
            EventKind::AmbiguousMatch,
            displaced,
            &format!("Match of 0x{displaced:x} to 0x{recomp:x} replaced by 0x{orig:x}"),
        );
    }
}
