use crate::backend::{DatumRouter, TelemetryBackend};
use crate::errors::ReplayError;
use crate::replay::sequencer::Selector;
use crate::runtime::CancelSignal;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub requests: u32,
    pub records: usize,
    pub records_by_kind: BTreeMap<String, usize>,
    pub end_of_stream: bool,
    pub cancelled: bool,
    pub skipped_malformed: u64,
}

/// Pull up to `iterations` datums, stopping early when replay data runs out
/// or `cancel` fires.
pub fn run_job<B: TelemetryBackend>(
    router: &mut DatumRouter<B>,
    selector: &Selector,
    iterations: u32,
    cancel: &CancelSignal,
) -> Result<JobSummary, ReplayError> {
    let mut summary = JobSummary::default();
    for _ in 0..iterations {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        let datum = match router.get_datum(selector, cancel) {
            Ok(datum) => datum,
            Err(ReplayError::Cancelled) => {
                summary.cancelled = true;
                break;
            }
            Err(e) => return Err(e),
        };
        summary.requests += 1;
        tracing::debug!(
            origin = ?datum.origin,
            kind = datum.kind.as_deref().unwrap_or(""),
            records = datum.records.len(),
            "got datum"
        );
        if let Some(kind) = &datum.kind {
            *summary.records_by_kind.entry(kind.clone()).or_default() += datum.records.len();
        }
        summary.records += datum.records.len();
        if datum.end_of_stream {
            summary.end_of_stream = true;
            break;
        }
    }
    summary.skipped_malformed = router.sequencer().stats().malformed;
    Ok(summary)
}

pub fn summary_line(summary: &JobSummary) -> String {
    let kinds = summary
        .records_by_kind
        .iter()
        .map(|(kind, count)| format!("{kind}:{count}"))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "replay job complete: requests={} records={} kinds={} end_of_stream={} cancelled={} skipped_malformed={}",
        summary.requests,
        summary.records,
        if kinds.is_empty() { "-" } else { kinds.as_str() },
        summary.end_of_stream,
        summary.cancelled,
        summary.skipped_malformed
    )
}
