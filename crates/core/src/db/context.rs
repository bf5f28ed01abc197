use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::db::{
    collect_source_files, open_project_db, EntityStore, ProjectConfig, ProjectDb, ProjectLayout,
};
use crate::services::CorrelationPipeline;

/// An opened project: layout, config, and database in one place.
#[derive(Debug)]
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: ProjectConfig,
    pub db_path: PathBuf,
    pub db: ProjectDb,
}

impl ProjectContext {
    /// Load project config and open the database for a given root.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let (config, db_path, db) = open_project_db(&layout)?;
        Ok(Self { layout, config, db_path, db })
    }

    /// Pipeline configured with this project's matching options.
    pub fn pipeline(&self) -> CorrelationPipeline {
        CorrelationPipeline::new(self.config.matching)
    }

    /// Files found under the configured source directories.
    pub fn source_files(&self) -> Vec<String> {
        collect_source_files(&self.layout, &self.config)
    }

    /// The store saved by the last correlation run (empty before any run).
    pub fn saved_store(&self) -> Result<EntityStore> {
        self.db.load_store().with_context(|| {
            format!("Failed to load saved entities from {}", self.db_path.display())
        })
    }
}
