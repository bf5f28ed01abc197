use std::fs;

use anyhow::{Context, Result};
use correlate_core::db::{ProjectConfig, ProjectDb, ProjectLayout};
use serde::Serialize;

use crate::commands::{open_project, print_dir_status, print_json};
use crate::{canonicalize_or_current, infer_project_name};

#[derive(Serialize)]
pub struct ProjectInfoSnapshot {
    pub name: String,
    pub root: String,
    pub config_file: String,
    pub config_version: String,
    pub db_path: String,
    pub truncate_symbols: bool,
    pub source_dirs: Vec<String>,
    pub layout: ProjectInfoLayout,
    pub entities: i64,
    pub runs: i64,
}

#[derive(Serialize)]
pub struct ProjectInfoLayout {
    pub meta_dir: String,
    pub reports_dir: String,
}

/// Initialize a new project at `root`.
pub fn init_project_command(root: &str, name: Option<String>) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);

    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&root_path),
    };

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;
    fs::create_dir_all(&layout.reports_dir).with_context(|| {
        format!("Failed to create reports dir: {}", layout.reports_dir.display())
    })?;

    let config = ProjectConfig::new(&project_name, layout.db_path_relative_string());
    let json = serde_json::to_string_pretty(&config)?;
    fs::write(&layout.project_config_path, json).with_context(|| {
        format!("Failed to write project config: {}", layout.project_config_path.display())
    })?;

    ProjectDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize project database at {}", layout.db_path.display())
    })?;
    tracing::debug!(root = %layout.root.display(), "Initialized project");

    println!("Initialized correlation project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.project_config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Reports dir: {}", layout.reports_dir.display());

    Ok(())
}

/// Show basic information about an existing project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let entities = ctx.db.entity_count().context("Failed to count saved entities")?;
    let runs = ctx.db.run_count().context("Failed to count correlation runs")?;
    let layout = &ctx.layout;
    let config = &ctx.config;

    if json {
        let snapshot = ProjectInfoSnapshot {
            name: config.name.clone(),
            root: layout.root.display().to_string(),
            config_file: layout.project_config_path.display().to_string(),
            config_version: config.config_version.clone(),
            db_path: config.db.path.clone(),
            truncate_symbols: config.matching.truncate_symbols,
            source_dirs: config.source_dirs.clone(),
            layout: ProjectInfoLayout {
                meta_dir: layout.meta_dir.display().to_string(),
                reports_dir: layout.reports_dir.display().to_string(),
            },
            entities,
            runs,
        };
        return print_json(&snapshot);
    }

    println!("Correlation Project Info");
    println!("========================");
    println!("Name: {}", config.name);
    println!("Root: {}", layout.root.display());
    println!("Config file: {}", layout.project_config_path.display());
    println!("Config version: {}", config.config_version);
    println!("DB path (config): {}", config.db.path);
    println!("Truncate symbols: {}", config.matching.truncate_symbols);
    if !config.source_dirs.is_empty() {
        println!("Source dirs: {}", config.source_dirs.join(", "));
    }
    println!();
    println!("Directories:");
    print_dir_status("Meta dir (.correlate)", &layout.meta_dir);
    print_dir_status("Reports dir", &layout.reports_dir);
    println!();
    println!("Saved entities: {}", entities);
    println!("Correlation runs: {}", runs);

    Ok(())
}
