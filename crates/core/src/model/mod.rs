//! Core data model for correlated entities.
//!
//! An entity is anchored at an address in the original binary, the recompiled
//! binary, or both (a "match"). Everything else about it lives in
//! [`EntityAttrs`], which has one explicit optional field per known attribute
//! plus an `extras` map for keys this crate does not know about yet.

mod names;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use names::entity_name_from_string;

/// Which of the two binaries an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The shipped binary whose addresses we are trying to discover.
    Orig,
    /// The binary rebuilt from decompiled source, with full debug info.
    Recomp,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Orig => "orig",
            Side::Recomp => "recomp",
        }
    }
}

/// Broadly tells us what kind of comparison an entity needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Unknown,
    Function,
    Data,
    Pointer,
    String,
    Widechar,
    Vtable,
    Float,
    Line,
    Import,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Unknown => "unknown",
            EntityType::Function => "function",
            EntityType::Data => "data",
            EntityType::Pointer => "pointer",
            EntityType::String => "string",
            EntityType::Widechar => "widechar",
            EntityType::Vtable => "vtable",
            EntityType::Float => "float",
            EntityType::Line => "line",
            EntityType::Import => "import",
        }
    }

    /// Parse the lowercase tag used in serialized data and on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        let parsed = match value.to_ascii_lowercase().as_str() {
            "unknown" => EntityType::Unknown,
            "function" => EntityType::Function,
            "data" => EntityType::Data,
            "pointer" => EntityType::Pointer,
            "string" => EntityType::String,
            "widechar" => EntityType::Widechar,
            "vtable" => EntityType::Vtable,
            "float" => EntityType::Float,
            "line" => EntityType::Line,
            "import" => EntityType::Import,
            _ => return None,
        };
        Some(parsed)
    }

    /// STRING and WIDECHAR entities both carry text that can be read and named.
    pub fn is_string(self) -> bool {
        matches!(self, EntityType::String | EntityType::Widechar)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// Attribute set attached to an entity.
///
/// Attributes are additive: the merge helpers below set or merge values but
/// never clear one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAttrs {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Disambiguated display name (e.g. for overloaded functions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_name: Option<String>,
    /// Mangled/decorated linker name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_var: Option<bool>,
    /// Orig address of the function enclosing a static variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_function: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_orig: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_recomp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wide: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

fn overwrite<T: Clone + PartialEq>(dst: &mut Option<T>, src: &Option<T>) -> bool {
    match src {
        Some(value) if dst.as_ref() != Some(value) => {
            *dst = Some(value.clone());
            true
        }
        _ => false,
    }
}

fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) -> bool {
    if dst.is_none() && src.is_some() {
        *dst = src.clone();
        true
    } else {
        false
    }
}

/// Recursive merge where `src` wins on conflicting leaves.
fn deep_overwrite(dst: &mut serde_json::Value, src: &serde_json::Value) -> bool {
    match (dst, src) {
        (serde_json::Value::Object(dst_map), serde_json::Value::Object(src_map)) => {
            let mut changed = false;
            for (key, value) in src_map {
                match dst_map.get_mut(key) {
                    Some(existing) => changed |= deep_overwrite(existing, value),
                    None => {
                        dst_map.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        (dst, src) => {
            if *dst != *src {
                *dst = src.clone();
                true
            } else {
                false
            }
        }
    }
}

/// Recursive merge that only adds keys missing from `dst`.
fn deep_fill(dst: &mut serde_json::Value, src: &serde_json::Value) -> bool {
    match (dst, src) {
        (serde_json::Value::Object(dst_map), serde_json::Value::Object(src_map)) => {
            let mut changed = false;
            for (key, value) in src_map {
                match dst_map.get_mut(key) {
                    Some(existing) => changed |= deep_fill(existing, value),
                    None => {
                        dst_map.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            changed
        }
        _ => false,
    }
}

impl EntityAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Every field set in `patch` replaces ours; `extras` are deep-merged
    /// with `patch` winning. Returns whether anything changed.
    pub fn overwrite_from(&mut self, patch: &EntityAttrs) -> bool {
        let mut changed = false;
        changed |= overwrite(&mut self.entity_type, &patch.entity_type);
        changed |= overwrite(&mut self.name, &patch.name);
        changed |= overwrite(&mut self.computed_name, &patch.computed_name);
        changed |= overwrite(&mut self.symbol, &patch.symbol);
        changed |= overwrite(&mut self.size, &patch.size);
        changed |= overwrite(&mut self.base_class, &patch.base_class);
        changed |= overwrite(&mut self.static_var, &patch.static_var);
        changed |= overwrite(&mut self.parent_function, &patch.parent_function);
        changed |= overwrite(&mut self.ref_orig, &patch.ref_orig);
        changed |= overwrite(&mut self.ref_recomp, &patch.ref_recomp);
        changed |= overwrite(&mut self.wide, &patch.wide);
        changed |= overwrite(&mut self.filename, &patch.filename);
        changed |= overwrite(&mut self.line, &patch.line);
        changed |= overwrite(&mut self.skip, &patch.skip);
        changed |= overwrite(&mut self.stub, &patch.stub);
        changed |= overwrite(&mut self.verified, &patch.verified);
        for (key, value) in &patch.extras {
            match self.extras.get_mut(key) {
                Some(existing) => changed |= deep_overwrite(existing, value),
                None => {
                    self.extras.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// Take only the fields we do not have yet from `patch`.
    /// Returns whether anything changed.
    pub fn fill_missing_from(&mut self, patch: &EntityAttrs) -> bool {
        let mut changed = false;
        changed |= fill(&mut self.entity_type, &patch.entity_type);
        changed |= fill(&mut self.name, &patch.name);
        changed |= fill(&mut self.computed_name, &patch.computed_name);
        changed |= fill(&mut self.symbol, &patch.symbol);
        changed |= fill(&mut self.size, &patch.size);
        changed |= fill(&mut self.base_class, &patch.base_class);
        changed |= fill(&mut self.static_var, &patch.static_var);
        changed |= fill(&mut self.parent_function, &patch.parent_function);
        changed |= fill(&mut self.ref_orig, &patch.ref_orig);
        changed |= fill(&mut self.ref_recomp, &patch.ref_recomp);
        changed |= fill(&mut self.wide, &patch.wide);
        changed |= fill(&mut self.filename, &patch.filename);
        changed |= fill(&mut self.line, &patch.line);
        changed |= fill(&mut self.skip, &patch.skip);
        changed |= fill(&mut self.stub, &patch.stub);
        changed |= fill(&mut self.verified, &patch.verified);
        for (key, value) in &patch.extras {
            match self.extras.get_mut(key) {
                Some(existing) => changed |= deep_fill(existing, value),
                None => {
                    self.extras.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
        changed
    }

    /// True when the entity is a wide (UTF-16) string, either by flag or type.
    pub fn is_wide(&self) -> bool {
        self.wide.unwrap_or(false) || self.entity_type == Some(EntityType::Widechar)
    }
}

/// An address-anchored record tracked by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    orig_addr: Option<u64>,
    recomp_addr: Option<u64>,
    #[serde(flatten)]
    pub attrs: EntityAttrs,
}

impl Entity {
    /// Build an entity from its parts. At least one address is required.
    pub fn from_parts(
        orig_addr: Option<u64>,
        recomp_addr: Option<u64>,
        attrs: EntityAttrs,
    ) -> Option<Self> {
        if orig_addr.is_none() && recomp_addr.is_none() {
            return None;
        }
        Some(Self { orig_addr, recomp_addr, attrs })
    }

    /// One-sided entity known only in the original binary.
    pub fn orig(addr: u64, attrs: EntityAttrs) -> Self {
        Self { orig_addr: Some(addr), recomp_addr: None, attrs }
    }

    /// One-sided entity known only in the recompiled binary.
    pub fn recomp(addr: u64, attrs: EntityAttrs) -> Self {
        Self { orig_addr: None, recomp_addr: Some(addr), attrs }
    }

    pub fn orig_addr(&self) -> Option<u64> {
        self.orig_addr
    }

    pub fn recomp_addr(&self) -> Option<u64> {
        self.recomp_addr
    }

    pub fn addr(&self, side: Side) -> Option<u64> {
        match side {
            Side::Orig => self.orig_addr,
            Side::Recomp => self.recomp_addr,
        }
    }

    pub(crate) fn set_addr(&mut self, side: Side, addr: Option<u64>) {
        match side {
            Side::Orig => self.orig_addr = addr,
            Side::Recomp => self.recomp_addr = addr,
        }
    }

    pub fn matched(&self) -> bool {
        self.orig_addr.is_some() && self.recomp_addr.is_some()
    }

    pub fn entity_type(&self) -> Option<EntityType> {
        self.attrs.entity_type
    }

    pub fn name(&self) -> Option<&str> {
        self.attrs.name.as_deref()
    }

    /// A missing size means there are no bytes to read for this entity.
    pub fn size_or_zero(&self) -> u64 {
        self.attrs.size.unwrap_or(0)
    }

    /// First available name, preferring the computed (disambiguated) one.
    pub fn best_name(&self) -> Option<&str> {
        self.attrs.computed_name.as_deref().or(self.attrs.name.as_deref())
    }

    /// Name plus entity type, e.g. `"Tick (FUNCTION)"`, for diff headers.
    pub fn match_name(&self) -> Option<String> {
        let best = self.best_name()?;
        let ctype = self.attrs.entity_type.map(|t| t.to_string()).unwrap_or_else(|| "UNK".into());
        Some(format!("{best} ({ctype})"))
    }

    /// Name for an address that points inside this entity.
    pub fn offset_name(&self, ofs: u64) -> Option<String> {
        self.attrs.name.as_ref().map(|name| format!("{name}+{ofs} (OFFSET)"))
    }
}
