use chrono::{DateTime, Utc};
use tracing::Span;

/// Per-run handle threaded through every pipeline call.
///
/// Carries the run identifier used to name report artifacts and the tracing
/// span that components enter before logging, so log lines are attributed to
/// the run without a named global logger.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: i64,
    pub started_at: DateTime<Utc>,
    pub span: Span,
}

impl RunContext {
    /// Start a run stamped with the current time; the run id is the unix timestamp in seconds.
    pub fn start() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(started_at: DateTime<Utc>) -> Self {
        let run_id = started_at.timestamp();
        let span = tracing::info_span!("run", run_id);
        Self { run_id, started_at, span }
    }

    /// File name of the aggregate report for this run.
    pub fn report_file_name(&self) -> String {
        format!("total_result_{}.txt", self.run_id)
    }
}
