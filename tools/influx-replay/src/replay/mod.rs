//! File-backed replay of captured QA log lines.
//!
//! # Overview
//!
//! Instead of querying the telemetry database, a development or test run can
//! read back the confusion-matrix records an earlier run logged:
//! 1. **LineSource** – forward-only line reader with one line of pushback
//! 2. **Record** – one parsed JSON log line and its kind
//! 3. **ReplaySequencer** – filters, parses and groups lines into runs
//!
//! Each `get_run` call hands back one maximal run of same-kind records, so
//! a consumer that alternates between kinds sees the batches in file order.

pub mod line_source;
pub mod record;
pub mod sequencer;
