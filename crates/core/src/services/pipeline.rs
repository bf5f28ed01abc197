use serde::{Deserialize, Serialize};

use crate::db::{BatchSummary, EntityStore, LinesDb, StoreResult};
use crate::events::Reporter;
use crate::services::matching::{
    match_functions, match_lines, match_ref, match_static_variables, match_strings,
    match_symbols, match_variables, match_vtables, name_overloaded_functions,
};

fn default_truncate_symbols() -> bool {
    true
}

/// Knobs for the matching passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Compare symbols and names on their first 255 characters only.
    #[serde(default = "default_truncate_symbols")]
    pub truncate_symbols: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self { truncate_symbols: default_truncate_symbols() }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub pass: &'static str,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub passes: Vec<PassReport>,
}

impl PipelineReport {
    /// Sum of all pass summaries.
    pub fn total(&self) -> BatchSummary {
        let mut total = BatchSummary::default();
        for pass in &self.passes {
            total += pass.summary;
        }
        total
    }

    /// Entities linked by any pass, via a match or a recomp address.
    pub fn linked(&self) -> usize {
        let total = self.total();
        total.matched + total.recomp_assigned
    }
}

/// Runs every matching pass in dependency order.
#[derive(Debug, Clone, Default)]
pub struct CorrelationPipeline {
    options: MatchOptions,
}

impl CorrelationPipeline {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Run all passes against `store`.
    ///
    /// Each pass commits on its own. A failing pass stops the run and its
    /// error is returned; passes before it keep their results. `match_lines`
    /// is skipped without a line table.
    pub fn run(
        &self,
        store: &mut EntityStore,
        lines: Option<&LinesDb>,
        reporter: &mut dyn Reporter,
    ) -> StoreResult<PipelineReport> {
        let truncate = self.options.truncate_symbols;
        let mut report = PipelineReport::default();

        let mut record = |pass: &'static str, result: StoreResult<BatchSummary>| {
            match result {
                Ok(summary) => {
                    tracing::debug!(pass, ?summary, "Pass complete");
                    report.passes.push(PassReport { pass, summary });
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(pass, error = %err, "Pass failed; batch rolled back");
                    Err(err)
                }
            }
        };

        record("symbols", match_symbols(store, reporter, truncate))?;
        record("functions", match_functions(store, reporter, truncate))?;
        record("vtables", match_vtables(store, reporter))?;
        record("static_variables", match_static_variables(store, reporter))?;
        record("variables", match_variables(store, reporter))?;
        record("strings", match_strings(store, reporter))?;
        if let Some(lines) = lines {
            record("lines", match_lines(store, lines, reporter))?;
        }
        record("ref", match_ref(store, reporter))?;
        record("overloads", name_overloaded_functions(store))?;

        tracing::info!(
            linked = report.linked(),
            entities = store.count(),
            matched = store.get_matches().len(),
            "Correlation complete"
        );
        Ok(report)
    }
}
