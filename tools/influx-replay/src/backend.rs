//! The "get one datum" boundary between the application and its data source.
//!
//! While a replay file is active every request is answered from it; otherwise
//! the request goes to the live telemetry backend.

use crate::errors::ReplayError;
use crate::replay::record::Record;
use crate::replay::sequencer::{ReplaySequencer, Selector};
use crate::runtime::CancelSignal;

pub trait TelemetryBackend {
    fn fetch(&mut self, selector: &Selector) -> Result<Vec<Record>, ReplayError>;
}

/// Stand-in for the live database when none is wired up: every query comes
/// back empty.
#[derive(Debug, Default)]
pub struct OfflineBackend;

impl TelemetryBackend for OfflineBackend {
    fn fetch(&mut self, selector: &Selector) -> Result<Vec<Record>, ReplayError> {
        tracing::debug!(kind = %selector.kind, "live backend offline, returning no data");
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatumOrigin {
    Replay,
    Live,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub origin: DatumOrigin,
    pub kind: Option<String>,
    pub records: Vec<Record>,
    /// Only a replay source can run out.
    pub end_of_stream: bool,
}

pub struct DatumRouter<B> {
    sequencer: ReplaySequencer,
    live: B,
}

impl<B: TelemetryBackend> DatumRouter<B> {
    pub fn new(sequencer: ReplaySequencer, live: B) -> Self {
        Self { sequencer, live }
    }

    pub fn sequencer(&self) -> &ReplaySequencer {
        &self.sequencer
    }

    pub fn get_datum(
        &mut self,
        selector: &Selector,
        cancel: &CancelSignal,
    ) -> Result<Datum, ReplayError> {
        if self.sequencer.is_active() {
            let run = self.sequencer.get_run_until(selector, cancel)?;
            return Ok(Datum {
                origin: DatumOrigin::Replay,
                kind: run.kind,
                records: run.records,
                end_of_stream: run.end_of_stream,
            });
        }
        let records = self.live.fetch(selector)?;
        let kind = (!records.is_empty()).then(|| selector.kind.clone());
        Ok(Datum {
            origin: DatumOrigin::Live,
            kind,
            records,
            end_of_stream: false,
        })
    }

    pub fn close(&mut self) {
        self.sequencer.deactivate();
    }
}
