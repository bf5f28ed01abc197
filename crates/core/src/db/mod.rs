//! Entity storage and project persistence.
//!
//! - `EntityStore`: in-memory, address-indexed entities; the working state
//!   of a correlation run.
//! - `Batch`: staged, atomically applied changes to a store.
//! - `LinesDb`: source line → function address lookup.
//! - `ProjectDb`: SQLite database holding saved stores, runs, and events.
//! - `ProjectConfig` / `ProjectLayout` / `ProjectContext`: project metadata
//!   and on-disk layout.

pub mod batch;
pub mod config;
pub mod context;
pub mod layout;
pub mod lines;
pub mod models;
pub mod project_db;
pub mod store;
pub mod strings;
pub mod util;

pub use batch::{Batch, BatchSummary};
pub use config::{DbConfig, ProjectConfig};
pub use context::ProjectContext;
pub use layout::ProjectLayout;
pub use lines::LinesDb;
pub use models::{CorrelationRunRecord, RunStatus, StoredRun};
pub use project_db::{DbError, DbResult, ProjectDb, CURRENT_SCHEMA_VERSION};
pub use store::{EntityStore, StoreError, StoreResult};
pub use strings::decode_string;
pub use util::{collect_source_files, load_project_config, open_project_db};
