use std::path::Path;

use anyhow::Result;
use correlate_core::db::ProjectContext;

use crate::canonicalize_or_current;

/// Open the project rooted at `root` (config plus database).
pub fn open_project(root: &str) -> Result<ProjectContext> {
    let root_path = canonicalize_or_current(root)?;
    ProjectContext::from_root(&root_path)
}

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

/// Format an optional address for tables.
pub fn fmt_addr(addr: Option<u64>) -> String {
    match addr {
        Some(addr) => format!("{addr:#x}"),
        None => "-".to_string(),
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
