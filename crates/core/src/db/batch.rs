//! Staged, all-or-nothing updates to an [`EntityStore`].
//!
//! Matching passes decide everything by reading the store, stage their
//! decisions here, then apply once. Applying runs in a fixed order:
//! inserts, attribute updates, matches, then recomp-address assignments.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::store::{EntityStore, StoreResult};
use crate::model::{EntityAttrs, Side};

/// What a batch actually changed once applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub updated: usize,
    pub matched: usize,
    pub recomp_assigned: usize,
}

impl BatchSummary {
    pub fn is_empty(&self) -> bool {
        *self == BatchSummary::default()
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.matched + self.recomp_assigned
    }
}

impl std::ops::AddAssign for BatchSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.matched += rhs.matched;
        self.recomp_assigned += rhs.recomp_assigned;
    }
}

/// Pending changes for an [`EntityStore`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    orig_insert: BTreeMap<u64, EntityAttrs>,
    recomp_insert: BTreeMap<u64, EntityAttrs>,
    orig_set: BTreeMap<u64, EntityAttrs>,
    recomp_set: BTreeMap<u64, EntityAttrs>,
    orig_to_recomp: BTreeMap<u64, u64>,
    recomp_to_orig: BTreeMap<u64, u64>,
    recomp_addr: BTreeMap<u64, u64>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.orig_insert.is_empty()
            && self.recomp_insert.is_empty()
            && self.orig_set.is_empty()
            && self.recomp_set.is_empty()
            && self.orig_to_recomp.is_empty()
            && self.recomp_addr.is_empty()
    }

    /// Number of staged matches.
    pub fn match_count(&self) -> usize {
        self.orig_to_recomp.len()
    }

    fn inserts_mut(&mut self, side: Side) -> &mut BTreeMap<u64, EntityAttrs> {
        match side {
            Side::Orig => &mut self.orig_insert,
            Side::Recomp => &mut self.recomp_insert,
        }
    }

    fn sets_mut(&mut self, side: Side) -> &mut BTreeMap<u64, EntityAttrs> {
        match side {
            Side::Orig => &mut self.orig_set,
            Side::Recomp => &mut self.recomp_set,
        }
    }

    /// Stage creation of a one-sided entity. Ignored at apply time if the
    /// address already exists; within the batch the first value wins.
    pub fn insert(&mut self, side: Side, addr: u64, attrs: EntityAttrs) {
        self.inserts_mut(side).entry(addr).or_default().fill_missing_from(&attrs);
    }

    pub fn insert_orig(&mut self, addr: u64, attrs: EntityAttrs) {
        self.insert(Side::Orig, addr, attrs);
    }

    pub fn insert_recomp(&mut self, addr: u64, attrs: EntityAttrs) {
        self.insert(Side::Recomp, addr, attrs);
    }

    /// Stage an attribute update that creates the entity when missing.
    /// Later values win, both within the batch and over the store.
    pub fn set(&mut self, side: Side, addr: u64, attrs: EntityAttrs) {
        self.sets_mut(side).entry(addr).or_default().overwrite_from(&attrs);
    }

    pub fn set_orig(&mut self, addr: u64, attrs: EntityAttrs) {
        self.set(Side::Orig, addr, attrs);
    }

    pub fn set_recomp(&mut self, addr: u64, attrs: EntityAttrs) {
        self.set(Side::Recomp, addr, attrs);
    }

    /// Stage a match between `orig` and the entity at `recomp`.
    ///
    /// A batch maps each recomp address to at most one orig. Re-matching a
    /// recomp replaces its earlier orig, whose staged match is dropped; that
    /// displaced orig address is returned so the caller can report it.
    pub fn match_pair(&mut self, orig: u64, recomp: u64) -> Option<u64> {
        if let Some(previous_recomp) = self.orig_to_recomp.remove(&orig) {
            self.recomp_to_orig.remove(&previous_recomp);
        }
        let displaced = self.recomp_to_orig.insert(recomp, orig);
        if let Some(displaced) = displaced {
            self.orig_to_recomp.remove(&displaced);
        }
        self.orig_to_recomp.insert(orig, recomp);
        displaced.filter(|d| *d != orig)
    }

    /// Stage assigning `recomp` to the one-sided orig entity at `orig`.
    pub fn set_recomp_addr(&mut self, orig: u64, recomp: u64) {
        self.recomp_addr.insert(orig, recomp);
    }

    /// Discard all staged changes.
    pub fn reset(&mut self) {
        *self = Batch::default();
    }

    /// Apply every staged change to `store`, or none of them.
    ///
    /// On error the store is left exactly as it was and the batch is gone.
    pub fn apply(self, store: &mut EntityStore) -> StoreResult<BatchSummary> {
        if self.is_empty() {
            return Ok(BatchSummary::default());
        }

        let mut working = store.clone();
        let summary = self.apply_to(&mut working)?;
        *store = working;
        Ok(summary)
    }

    fn apply_to(self, store: &mut EntityStore) -> StoreResult<BatchSummary> {
        let mut summary = BatchSummary::default();

        for (side, inserts) in [(Side::Orig, self.orig_insert), (Side::Recomp, self.recomp_insert)] {
            for (addr, attrs) in inserts {
                if store.insert_if_absent(side, addr, &attrs) {
                    summary.inserted += 1;
                }
            }
        }

        for (side, sets) in [(Side::Orig, self.orig_set), (Side::Recomp, self.recomp_set)] {
            for (addr, attrs) in sets {
                let existed = store.get(side, addr, true).is_some();
                if store.upsert(side, addr, &attrs) {
                    if existed {
                        summary.updated += 1;
                    } else {
                        summary.inserted += 1;
                    }
                }
            }
        }

        for (orig, recomp) in self.orig_to_recomp {
            if store.merge_match(orig, recomp)? {
                summary.matched += 1;
            }
        }

        for (orig, recomp) in self.recomp_addr {
            if store.assign_recomp_addr(orig, recomp)? {
                summary.recomp_assigned += 1;
            }
        }

        tracing::trace!(?summary, "Applied batch");
        Ok(summary)
    }
}
