//! Correlation services built on the store: ingestion, matching passes,
//! verification, the pipeline that strings them together, and the runner
//! that records a whole run in a project.

pub mod ingest;
pub mod matching;
pub mod pipeline;
pub mod runner;
pub mod verify;

pub use ingest::{IngestBundle, IngestError, LineFile, LinesSection, OrigRecord, RecompRecord};
pub use pipeline::{CorrelationPipeline, MatchOptions, PassReport, PipelineReport};
pub use runner::{CorrelationRunner, RunError, RunInputs, RunOutcome, RunRequest};
pub use verify::{
    check_code_strings, check_vtables, StringAnnotation, VtableWarning, VtableWarningReason,
};
