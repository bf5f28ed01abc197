//! One full correlation run against a project: ingest, match, verify,
//! persist.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::backends::ImageReader;
use crate::db::{
    CorrelationRunRecord, DbError, EntityStore, ProjectContext, RunStatus, StoreError,
};
use crate::events::{Event, EventLog};
use crate::model::Side;
use crate::services::ingest::{IngestBundle, IngestError};
use crate::services::pipeline::PipelineReport;
use crate::services::verify::{check_code_strings, check_vtables, VtableWarning};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Ingest failed: {0}")]
    Ingest(#[from] IngestError),
    #[error("Matching failed: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to persist run: {0}")]
    Db(#[from] DbError),
}

/// Bookkeeping for a run: how the inputs are identified in the run history.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub label: String,
    pub input_hash: String,
    pub orig_image_hash: Option<String>,
    pub recomp_image_hash: Option<String>,
}

/// Inputs of a run. Images are optional; without them strings are not read
/// and verification is skipped.
#[derive(Clone, Copy)]
pub struct RunInputs<'a> {
    pub bundle: &'a IngestBundle,
    pub orig_image: Option<&'a dyn ImageReader>,
    pub recomp_image: Option<&'a dyn ImageReader>,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: i64,
    pub entities: usize,
    pub matched: usize,
    pub report: PipelineReport,
    pub vtable_warnings: Vec<VtableWarning>,
    pub string_mismatches: usize,
    pub events: Vec<Event>,
}

/// Runs the correlation pipeline for a project and records the result.
pub struct CorrelationRunner<'a> {
    pub ctx: &'a ProjectContext,
}

impl<'a> CorrelationRunner<'a> {
    pub fn new(ctx: &'a ProjectContext) -> Self {
        Self { ctx }
    }

    /// Build a fresh store from `inputs`, match it, verify it, then replace
    /// the project's saved store and append the run to the history.
    ///
    /// A failing pass is still recorded as a failed run before the error is
    /// returned; the saved store is left as it was.
    pub fn run(&self, request: &RunRequest, inputs: RunInputs<'_>) -> Result<RunOutcome, RunError> {
        let started_at = Utc::now().to_rfc3339();
        let mut store = EntityStore::new();
        let mut events = EventLog::new();

        inputs.bundle.ingest(&mut store)?;
        if let Some(image) = inputs.orig_image {
            store.read_strings(Side::Orig, image);
        }
        if let Some(image) = inputs.recomp_image {
            store.read_strings(Side::Recomp, image);
        }
        store.name_strings()?;

        let lines = inputs.bundle.lines_db(&self.ctx.source_files());
        let report = match self.ctx.pipeline().run(&mut store, lines.as_ref(), &mut events) {
            Ok(report) => report,
            Err(err) => {
                let record = self.record(request, &store, &events, RunStatus::Failed, started_at);
                let run_id = self.ctx.db.insert_run(&record)?;
                self.ctx.db.insert_events(run_id, events.events())?;
                return Err(err.into());
            }
        };

        let mut vtable_warnings = Vec::new();
        let mut string_mismatches = 0;
        if let Some(image) = inputs.orig_image {
            vtable_warnings = check_vtables(&store, image);
            if !inputs.bundle.strings.is_empty() {
                string_mismatches =
                    check_code_strings(&store, image, &inputs.bundle.strings, &mut events);
            }
        }

        self.ctx.db.save_store(&store)?;
        let record = self.record(request, &store, &events, RunStatus::Succeeded, started_at);
        let run_id = self.ctx.db.insert_run(&record)?;
        self.ctx.db.insert_events(run_id, events.events())?;
        tracing::info!(run_id, label = %request.label, "Recorded correlation run");

        Ok(RunOutcome {
            run_id,
            entities: store.count(),
            matched: store.get_matches().len(),
            report,
            vtable_warnings,
            string_mismatches,
            events: events.into_events(),
        })
    }

    fn record(
        &self,
        request: &RunRequest,
        store: &EntityStore,
        events: &EventLog,
        status: RunStatus,
        started_at: String,
    ) -> CorrelationRunRecord {
        CorrelationRunRecord {
            label: request.label.clone(),
            input_hash: request.input_hash.clone(),
            orig_image_hash: request.orig_image_hash.clone(),
            recomp_image_hash: request.recomp_image_hash.clone(),
            status,
            entities: store.count() as i64,
            matched: store.get_matches().len() as i64,
            events: events.len() as i64,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        }
    }
}
