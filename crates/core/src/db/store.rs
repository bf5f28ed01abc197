//! In-memory entity store.
//!
//! Entities live in an id-keyed map with two address indexes, one per side.
//! Both address indexes are unique: an orig (or recomp) address identifies at
//! most one entity. Reads are range queries over the address indexes; every
//! mutation goes through a method here so the indexes never drift.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use thiserror::Error;

use crate::db::batch::Batch;
use crate::model::{Entity, EntityAttrs, EntityType, Side};

/// Error type for store mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// An entity was offered with neither an orig nor a recomp address.
    #[error("entity has neither an orig nor a recomp address")]
    MissingAddress,

    /// The orig address already belongs to another matched entity.
    #[error("orig address {addr:#x} is already matched to recomp {existing:#x}")]
    OrigAddressInUse { addr: u64, existing: u64 },

    /// The recomp address already belongs to another entity.
    #[error("recomp address {addr:#x} is already in use")]
    RecompAddressInUse { addr: u64 },

    /// Inserting a pre-built entity would duplicate an address.
    #[error("{side} address {addr:#x} already exists in the store")]
    DuplicateAddress { side: &'static str, addr: u64 },
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

type EntityId = u64;

/// Address-indexed collection of entities.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    next_id: EntityId,
    by_orig: BTreeMap<u64, EntityId>,
    by_recomp: BTreeMap<u64, EntityId>,
    by_name: HashMap<String, BTreeSet<EntityId>>,
    raw: HashMap<(Side, u64), Vec<u8>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities (matched or not).
    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Start a new empty batch. Apply it with [`Batch::apply`].
    pub fn batch(&self) -> Batch {
        Batch::new()
    }

    /// Stage changes in a batch and apply them when `f` succeeds.
    ///
    /// If `f` fails the batch is dropped and the store is untouched.
    pub fn with_batch<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Batch, &EntityStore) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut batch = Batch::new();
        let out = f(&mut batch, self)?;
        batch.apply(self)?;
        Ok(out)
    }

    fn index(&self, side: Side) -> &BTreeMap<u64, EntityId> {
        match side {
            Side::Orig => &self.by_orig,
            Side::Recomp => &self.by_recomp,
        }
    }

    fn index_mut(&mut self, side: Side) -> &mut BTreeMap<u64, EntityId> {
        match side {
            Side::Orig => &mut self.by_orig,
            Side::Recomp => &mut self.by_recomp,
        }
    }

    fn lookup(&self, side: Side, addr: u64, exact: bool) -> Option<&Entity> {
        let id = if exact {
            self.index(side).get(&addr).copied()
        } else {
            self.index(side).range(..=addr).next_back().map(|(_, id)| *id)
        }?;
        self.entities.get(&id)
    }

    /// Look up by orig address. When `exact` is false, return the entity with
    /// the greatest orig address `<= addr` instead.
    pub fn get_by_orig(&self, addr: u64, exact: bool) -> Option<&Entity> {
        self.lookup(Side::Orig, addr, exact)
    }

    /// Look up by recomp address; see [`EntityStore::get_by_orig`].
    pub fn get_by_recomp(&self, addr: u64, exact: bool) -> Option<&Entity> {
        self.lookup(Side::Recomp, addr, exact)
    }

    pub fn get(&self, side: Side, addr: u64, exact: bool) -> Option<&Entity> {
        self.lookup(side, addr, exact)
    }

    /// The entity at `orig_addr`, only if it is matched.
    pub fn get_one_match(&self, orig_addr: u64) -> Option<&Entity> {
        self.get_by_orig(orig_addr, true).filter(|e| e.matched())
    }

    /// Smallest orig address strictly greater than `addr` held by a typed,
    /// non-LINE entity. Untyped entities do not count.
    pub fn get_next_orig_addr(&self, addr: u64) -> Option<u64> {
        self.by_orig
            .range((Excluded(addr), Unbounded))
            .find(|(_, id)| {
                self.entities
                    .get(id)
                    .and_then(Entity::entity_type)
                    .is_some_and(|t| t != EntityType::Line)
            })
            .map(|(a, _)| *a)
    }

    /// Every entity, ordered by orig address (entities without one last),
    /// then by recomp address.
    pub fn get_all(&self) -> Vec<&Entity> {
        let mut out: Vec<&Entity> =
            self.by_orig.values().filter_map(|id| self.entities.get(id)).collect();
        out.extend(
            self.by_recomp
                .values()
                .filter_map(|id| self.entities.get(id))
                .filter(|e| e.orig_addr().is_none()),
        );
        out
    }

    /// Matched entities in orig address order.
    pub fn get_matches(&self) -> Vec<&Entity> {
        self.by_orig
            .values()
            .filter_map(|id| self.entities.get(id))
            .filter(|e| e.matched())
            .collect()
    }

    /// Matched entities of one type in orig address order.
    pub fn get_matches_by_type(&self, entity_type: EntityType) -> Vec<&Entity> {
        self.get_matches()
            .into_iter()
            .filter(|e| e.entity_type() == Some(entity_type))
            .collect()
    }

    /// Names of STRING entities that exist only in the recompiled binary.
    pub fn get_unmatched_strings(&self) -> Vec<String> {
        self.unmatched(Side::Recomp)
            .filter(|e| e.entity_type() == Some(EntityType::String))
            .filter_map(|e| e.name().map(str::to_owned))
            .collect()
    }

    /// Entities with a recomp address in `[start, end)`.
    pub fn get_recomp_range(&self, start: u64, end: u64) -> Vec<&Entity> {
        if start >= end {
            return Vec::new();
        }
        self.by_recomp
            .range(start..end)
            .filter_map(|(_, id)| self.entities.get(id))
            .collect()
    }

    /// Matched LINE entities with a recomp address in `[start, end]`,
    /// ordered by orig address.
    pub fn get_lines_in_recomp_range(&self, start: u64, end: u64) -> Vec<&Entity> {
        if start > end {
            return Vec::new();
        }
        let mut out: Vec<&Entity> = self
            .by_recomp
            .range(start..=end)
            .filter_map(|(_, id)| self.entities.get(id))
            .filter(|e| e.matched() && e.entity_type() == Some(EntityType::Line))
            .collect();
        out.sort_by_key(|e| e.orig_addr());
        out
    }

    /// Entities carrying exactly this `name`, ordered like [`EntityStore::get_all`].
    pub fn get_by_name(&self, name: &str) -> Vec<&Entity> {
        let Some(ids) = self.by_name.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<&Entity> = ids.iter().filter_map(|id| self.entities.get(id)).collect();
        out.sort_by_key(|e| (e.orig_addr().is_none(), e.orig_addr(), e.recomp_addr()));
        out
    }

    /// One-sided entities on `side`, ascending by that side's address.
    pub fn unmatched(&self, side: Side) -> impl Iterator<Item = &Entity> + '_ {
        self.index(side)
            .values()
            .filter_map(|id| self.entities.get(id))
            .filter(|e| !e.matched())
    }

    /// Link `orig_addr` onto the entity at `recomp_addr` and optionally set
    /// its type.
    ///
    /// Returns `false` without changing anything when the orig address is
    /// already used by some entity, or when there is no entity at
    /// `recomp_addr`.
    pub fn set_pair(
        &mut self,
        orig_addr: u64,
        recomp_addr: u64,
        entity_type: Option<EntityType>,
    ) -> bool {
        if self.by_orig.contains_key(&orig_addr) {
            tracing::debug!(orig = format!("{orig_addr:#x}"), "Orig address already in use");
            return false;
        }
        let Some(id) = self.by_recomp.get(&recomp_addr).copied() else {
            return false;
        };
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };

        let previous = entity.orig_addr();
        entity.set_addr(Side::Orig, Some(orig_addr));
        if let Some(entity_type) = entity_type {
            entity.attrs.entity_type = Some(entity_type);
        }
        if let Some(previous) = previous {
            self.by_orig.remove(&previous);
        }
        self.by_orig.insert(orig_addr, id);
        true
    }

    /// Record what we know about an orig address. Creates the entity when
    /// absent; otherwise only fills in fields it does not have yet.
    pub fn set_orig_symbol(&mut self, addr: u64, attrs: &EntityAttrs) -> bool {
        self.fill_or_insert(Side::Orig, addr, attrs)
    }

    /// Recomp counterpart of [`EntityStore::set_orig_symbol`].
    pub fn set_recomp_symbol(&mut self, addr: u64, attrs: &EntityAttrs) -> bool {
        self.fill_or_insert(Side::Recomp, addr, attrs)
    }

    fn fill_or_insert(&mut self, side: Side, addr: u64, attrs: &EntityAttrs) -> bool {
        let Some(id) = self.index(side).get(&addr).copied() else {
            return self.insert_if_absent(side, addr, attrs);
        };
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        let old_name = entity.attrs.name.clone();
        let changed = entity.attrs.fill_missing_from(attrs);
        if changed {
            self.reindex_name(id, old_name);
        }
        changed
    }

    /// Add a pre-built entity, e.g. when restoring a saved store.
    pub fn insert_entity(&mut self, entity: Entity) -> StoreResult<()> {
        let (orig, recomp) = (entity.orig_addr(), entity.recomp_addr());
        if orig.is_none() && recomp.is_none() {
            return Err(StoreError::MissingAddress);
        }
        if let Some(addr) = orig.filter(|a| self.by_orig.contains_key(a)) {
            return Err(StoreError::DuplicateAddress { side: "orig", addr });
        }
        if let Some(addr) = recomp.filter(|a| self.by_recomp.contains_key(a)) {
            return Err(StoreError::DuplicateAddress { side: "recomp", addr });
        }

        let id = self.next_id;
        self.next_id += 1;
        if let Some(addr) = orig {
            self.by_orig.insert(addr, id);
        }
        if let Some(addr) = recomp {
            self.by_recomp.insert(addr, id);
        }
        if let Some(name) = entity.name() {
            self.by_name.entry(name.to_owned()).or_default().insert(id);
        }
        self.entities.insert(id, entity);
        Ok(())
    }

    /// Raw bytes read for the entity at `addr` on `side`, if any.
    pub fn raw_bytes(&self, side: Side, addr: u64) -> Option<&[u8]> {
        self.raw.get(&(side, addr)).map(Vec::as_slice)
    }

    pub(crate) fn store_raw(&mut self, side: Side, addr: u64, bytes: Vec<u8>) {
        self.raw.insert((side, addr), bytes);
    }

    fn reindex_name(&mut self, id: EntityId, old: Option<String>) {
        let new = self.entities.get(&id).and_then(|e| e.attrs.name.clone());
        if old == new {
            return;
        }
        if let Some(old) = old {
            if let Some(ids) = self.by_name.get_mut(&old) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_name.remove(&old);
                }
            }
        }
        if let Some(new) = new {
            self.by_name.entry(new).or_default().insert(id);
        }
    }

    /// Create a one-sided entity if the address is unknown. Existing entities
    /// are left untouched. Returns whether an entity was created.
    pub(crate) fn insert_if_absent(&mut self, side: Side, addr: u64, attrs: &EntityAttrs) -> bool {
        if self.index(side).contains_key(&addr) {
            return false;
        }
        let entity = match side {
            Side::Orig => Entity::orig(addr, attrs.clone()),
            Side::Recomp => Entity::recomp(addr, attrs.clone()),
        };
        self.insert_entity(entity).is_ok()
    }

    /// Create or update the entity at `addr`, overwriting conflicting fields.
    /// Returns whether anything changed.
    pub(crate) fn upsert(&mut self, side: Side, addr: u64, attrs: &EntityAttrs) -> bool {
        let Some(id) = self.index(side).get(&addr).copied() else {
            return self.insert_if_absent(side, addr, attrs);
        };
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        let old_name = entity.attrs.name.clone();
        let changed = entity.attrs.overwrite_from(attrs);
        if changed {
            self.reindex_name(id, old_name);
        }
        changed
    }

    /// Attach `orig_addr` to the unmatched entity at `recomp_addr`.
    ///
    /// A one-sided orig entity at `orig_addr` is absorbed: its attributes fill
    /// in whatever the recomp entity lacks and it is then removed. Returns
    /// `Ok(false)` when there is nothing to do (no recomp entity, or it is
    /// already matched) and an error when `orig_addr` belongs to another
    /// matched entity.
    pub(crate) fn merge_match(&mut self, orig_addr: u64, recomp_addr: u64) -> StoreResult<bool> {
        let Some(recomp_id) = self.by_recomp.get(&recomp_addr).copied() else {
            return Ok(false);
        };
        if self.entities.get(&recomp_id).map_or(true, |e| e.orig_addr().is_some()) {
            return Ok(false);
        }

        let mut absorbed: Option<EntityAttrs> = None;
        if let Some(orig_id) = self.by_orig.get(&orig_addr).copied() {
            let Some(orig) = self.entities.get(&orig_id) else {
                return Ok(false);
            };
            if let Some(existing) = orig.recomp_addr() {
                return Err(StoreError::OrigAddressInUse { addr: orig_addr, existing });
            }
            if let Some(orig) = self.entities.remove(&orig_id) {
                let old_name = orig.attrs.name.clone();
                self.by_orig.remove(&orig_addr);
                if let Some(name) = old_name {
                    if let Some(ids) = self.by_name.get_mut(&name) {
                        ids.remove(&orig_id);
                        if ids.is_empty() {
                            self.by_name.remove(&name);
                        }
                    }
                }
                absorbed = Some(orig.attrs);
            }
        }

        let Some(entity) = self.entities.get_mut(&recomp_id) else {
            return Ok(false);
        };
        let old_name = entity.attrs.name.clone();
        if let Some(orig_attrs) = absorbed.as_ref() {
            entity.attrs.fill_missing_from(orig_attrs);
        }
        entity.set_addr(Side::Orig, Some(orig_addr));
        self.by_orig.insert(orig_addr, recomp_id);
        self.reindex_name(recomp_id, old_name);
        Ok(true)
    }

    /// Give the one-sided orig entity at `orig_addr` a recomp address.
    ///
    /// Does nothing when there is no such entity or it already has a recomp
    /// address. Fails when `recomp_addr` is held by some other entity.
    pub(crate) fn assign_recomp_addr(
        &mut self,
        orig_addr: u64,
        recomp_addr: u64,
    ) -> StoreResult<bool> {
        let Some(id) = self.by_orig.get(&orig_addr).copied() else {
            return Ok(false);
        };
        if self.entities.get(&id).map_or(true, |e| e.recomp_addr().is_some()) {
            return Ok(false);
        }
        if self.by_recomp.contains_key(&recomp_addr) {
            return Err(StoreError::RecompAddressInUse { addr: recomp_addr });
        }
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.set_addr(Side::Recomp, Some(recomp_addr));
            self.index_mut(Side::Recomp).insert(recomp_addr, id);
            return Ok(true);
        }
        Ok(false)
    }
}
