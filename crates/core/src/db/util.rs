use std::path::PathBuf;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::db::{ProjectConfig, ProjectDb, ProjectLayout};

/// Load the project config JSON from disk for a given layout.
pub fn load_project_config(layout: &ProjectLayout) -> Result<ProjectConfig> {
    let config_json = std::fs::read_to_string(&layout.project_config_path).with_context(|| {
        format!("Failed to read project config at {}", layout.project_config_path.display())
    })?;
    let config: ProjectConfig =
        serde_json::from_str(&config_json).context("Failed to parse project config JSON")?;
    Ok(config)
}

/// Resolve the DB path (respecting relative/absolute config) and open a ProjectDb.
pub fn open_project_db(layout: &ProjectLayout) -> Result<(ProjectConfig, PathBuf, ProjectDb)> {
    let config = load_project_config(layout)?;
    let db_path = layout.resolve(&config.db.path);
    let db = ProjectDb::open(&db_path)
        .with_context(|| format!("Failed to open project database at {}", db_path.display()))?;
    Ok((config, db_path, db))
}

/// Local source files under the configured source directories, resolved
/// against the project root. Missing directories are skipped and symlinks
/// are not followed; each file appears once.
pub fn collect_source_files(layout: &ProjectLayout, config: &ProjectConfig) -> Vec<String> {
    let mut files = Vec::new();
    for dir in config.source_dirs.iter().map(|dir| layout.resolve(dir)) {
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::debug!(
                        dir = %dir.display(),
                        error = %err,
                        "Skipping unreadable source path"
                    );
                    continue;
                }
            };
            if entry.file_type().is_file() {
                files.push(entry.path().to_string_lossy().to_string());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}
