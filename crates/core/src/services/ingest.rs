//! Ingestion bundles: the pre-collected entities of both binaries plus the
//! optional line table and string annotations, loaded from JSON or YAML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{Batch, BatchSummary, EntityStore, LinesDb, StoreError};
use crate::model::{EntityAttrs, EntityType};
use crate::services::verify::StringAnnotation;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read bundle at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse bundle JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse bundle YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid bundle: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// What the source annotations say about one orig address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrigRecord {
    pub address: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_var: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_function: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_orig: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wide: Option<bool>,
}

impl OrigRecord {
    pub fn attrs(&self) -> EntityAttrs {
        EntityAttrs {
            entity_type: self.entity_type,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            size: self.size,
            static_var: self.static_var,
            parent_function: self.parent_function,
            base_class: self.base_class.clone(),
            ref_orig: self.ref_orig,
            filename: self.filename.clone(),
            line: self.line,
            wide: self.wide,
            ..EntityAttrs::default()
        }
    }
}

/// What debug info says about one recomp address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecompRecord {
    pub address: u64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_recomp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wide: Option<bool>,
}

impl RecompRecord {
    pub fn attrs(&self) -> EntityAttrs {
        EntityAttrs {
            entity_type: self.entity_type,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            size: self.size,
            ref_recomp: self.ref_recomp,
            wide: self.wide,
            ..EntityAttrs::default()
        }
    }
}

/// Line records for one source file, as named by the debug info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFile {
    pub path: String,
    #[serde(default)]
    pub lines: Vec<(u32, u64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinesSection {
    /// Local source files; merged with the project's source directories.
    #[serde(default)]
    pub code_files: Vec<String>,
    #[serde(default)]
    pub files: Vec<LineFile>,
    #[serde(default)]
    pub function_starts: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestBundle {
    #[serde(default)]
    pub orig: Vec<OrigRecord>,
    #[serde(default)]
    pub recomp: Vec<RecompRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<LinesSection>,
    #[serde(default)]
    pub strings: Vec<StringAnnotation>,
}

impl IngestBundle {
    /// Load a bundle; `.json` files are JSON, everything else is YAML.
    pub fn load(path: &Path) -> IngestResult<Self> {
        let bytes = fs::read(path)
            .map_err(|source| IngestError::Io { path: path.to_path_buf(), source })?;
        let bundle: IngestBundle = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml::from_slice(&bytes)?
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Reject records that the matching passes could never use correctly.
    pub fn validate(&self) -> IngestResult<()> {
        for record in &self.orig {
            if record.entity_type == Some(EntityType::Line)
                && (record.filename.is_none() || record.line.is_none())
            {
                return Err(IngestError::Invalid(format!(
                    "LINE record at 0x{:x} needs both filename and line",
                    record.address
                )));
            }
            if record.static_var == Some(true) && record.parent_function.is_none() {
                return Err(IngestError::Invalid(format!(
                    "static variable at 0x{:x} has no parent_function",
                    record.address
                )));
            }
        }
        Ok(())
    }

    /// Load every record into `store`. Repeated addresses merge, later
    /// records winning.
    pub fn ingest(&self, store: &mut EntityStore) -> IngestResult<BatchSummary> {
        let mut batch = Batch::new();
        for record in &self.orig {
            batch.set_orig(record.address, record.attrs());
        }
        for record in &self.recomp {
            batch.set_recomp(record.address, record.attrs());
        }
        let summary = batch.apply(store)?;
        tracing::info!(
            orig = self.orig.len(),
            recomp = self.recomp.len(),
            entities = store.count(),
            "Ingested bundle"
        );
        Ok(summary)
    }

    /// Build the line lookup, if the bundle carries line data.
    /// `extra_code_files` are appended to the bundle's own file list.
    pub fn lines_db(&self, extra_code_files: &[String]) -> Option<LinesDb> {
        let section = self.lines.as_ref()?;
        let mut db = LinesDb::new(
            section.code_files.iter().chain(extra_code_files.iter()).cloned(),
        );
        for file in &section.files {
            if !db.add_lines(&file.path, file.lines.iter().copied()) {
                tracing::debug!(path = %file.path, "No local source file for debug path");
            }
        }
        db.add_function_starts(section.function_starts.iter().copied());
        Some(db)
    }
}
