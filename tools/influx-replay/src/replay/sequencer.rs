//! Turns a replay file into runs of same-kind records.
//!
//! A run ends at the first record whose kind differs from the kind that
//! opened it; that record's raw line is pushed back so the next call starts
//! with it. End of file closes the final run and is reported on the run
//! itself, never as an error.

use crate::errors::ReplayError;
use crate::replay::line_source::LineSource;
use crate::replay::record::{Record, DEFAULT_KIND_FIELD};
use crate::runtime::CancelSignal;
use std::path::Path;

pub const DEFAULT_MARKER: &str = "thing to grep for";

/// What the caller wants next: the kind it expects and the substring a line
/// must contain before it is worth parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub kind: String,
    pub marker: String,
}

impl Selector {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            marker: DEFAULT_MARKER.to_string(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }
}

/// One maximal block of consecutive same-kind records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Run {
    /// Kind shared by every record; `None` only when `records` is empty.
    pub kind: Option<String>,
    pub records: Vec<Record>,
    pub end_of_stream: bool,
}

impl Run {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines_read: u64,
    /// Lines without the selector marker.
    pub filtered_out: u64,
    /// Marker lines that failed to parse; non-zero means the log format drifted.
    pub malformed: u64,
    pub emitted: u64,
    pub runs: u64,
}

/// Replay state for one file. Owned by whoever activates it; not shared.
#[derive(Debug)]
pub struct ReplaySequencer {
    source: Option<LineSource>,
    kind_field: String,
    end_of_stream: bool,
    stats: ReplayStats,
}

impl Default for ReplaySequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaySequencer {
    pub fn new() -> Self {
        Self::with_kind_field(DEFAULT_KIND_FIELD)
    }

    pub fn with_kind_field(kind_field: impl Into<String>) -> Self {
        Self {
            source: None,
            kind_field: kind_field.into(),
            end_of_stream: false,
            stats: ReplayStats::default(),
        }
    }

    /// Open `path` and switch to replay mode. On failure the sequencer stays
    /// inactive and can be activated again.
    pub fn activate(&mut self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        if let Some(source) = &self.source {
            return Err(ReplayError::AlreadyActive(
                source.origin().display().to_string(),
            ));
        }
        let path = path.as_ref();
        let source = LineSource::open(path)?;
        tracing::info!(file = %path.display(), "replay started");
        self.source = Some(source);
        self.end_of_stream = false;
        self.stats = ReplayStats::default();
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Close the replay file. Calling this while inactive does nothing.
    pub fn deactivate(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            tracing::info!(
                file = %source.origin().display(),
                lines_read = self.stats.lines_read,
                emitted = self.stats.emitted,
                malformed = self.stats.malformed,
                "replay closed"
            );
        }
    }

    pub fn get_run(&mut self, selector: &Selector) -> Result<Run, ReplayError> {
        self.get_run_until(selector, &CancelSignal::never())
    }

    /// Collect the next run, checking `cancel` before every line.
    ///
    /// Cancellation closes the replay file and returns
    /// [`ReplayError::Cancelled`]; records gathered so far are dropped.
    pub fn get_run_until(
        &mut self,
        selector: &Selector,
        cancel: &CancelSignal,
    ) -> Result<Run, ReplayError> {
        let Some(source) = self.source.as_mut() else {
            return Err(ReplayError::NotActive);
        };
        tracing::debug!(kind = %selector.kind, "replay get_run");
        if self.end_of_stream {
            return Ok(Run {
                end_of_stream: true,
                ..Run::default()
            });
        }

        let mut run = Run::default();
        loop {
            if cancel.is_cancelled() {
                self.deactivate();
                return Err(ReplayError::Cancelled);
            }

            let was_pending = source.has_pending();
            let Some(line) = source.next_line()? else {
                self.end_of_stream = true;
                run.end_of_stream = true;
                break;
            };
            if !was_pending {
                self.stats.lines_read += 1;
            }

            // A pushed-back line already passed the marker check of the call
            // that read it.
            if !was_pending && !line.contains(selector.marker.as_str()) {
                self.stats.filtered_out += 1;
                continue;
            }

            let record = match Record::parse_line(&line, &self.kind_field) {
                Ok(record) => record,
                Err(failure) => {
                    self.stats.malformed += 1;
                    tracing::warn!(
                        line_number = source.line_number(),
                        error = %failure,
                        "skipping replay line: input format has changed"
                    );
                    continue;
                }
            };

            match run.kind.as_deref() {
                None => run.kind = Some(record.kind.clone()),
                Some(kind) if kind == record.kind => {}
                Some(_) => {
                    source.pushback(line);
                    break;
                }
            }
            self.stats.emitted += 1;
            run.records.push(record);
        }

        if !run.is_empty() {
            self.stats.runs += 1;
        }
        tracing::debug!(
            wanted = %selector.kind,
            got = run.kind.as_deref().unwrap_or(""),
            records = run.records.len(),
            end_of_stream = run.end_of_stream,
            "replay run assembled"
        );
        Ok(run)
    }
}

impl Drop for ReplaySequencer {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::{ReplaySequencer, ReplayStats, Selector};
    use crate::errors::ReplayError;
    use crate::runtime::CancelSignal;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("logs lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn line(kind: &str, tp: f64, fp: f64) -> String {
        format!(
            r#"{{"level":"INFO","timestamp":"2022-10-31T16:10:41.384Z","message":"thing to grep for goes here","kind":"{kind}","SumTruePositive":{tp},"SumFalsePositive":{fp},"SumTrueNegative":0,"SumFalseNegative":0,"NumMinutes":5}}"#
        )
    }

    fn write_replay(dir: &Path, lines: &[String]) -> PathBuf {
        let path = dir.join("replay.log");
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(&path, body).expect("write replay");
        path
    }

    fn active(lines: &[String]) -> (tempfile::TempDir, ReplaySequencer) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_replay(dir.path(), lines);
        let mut seq = ReplaySequencer::new();
        seq.activate(&path).expect("activate");
        (dir, seq)
    }

    #[test]
    fn kind_change_ends_run_and_is_replayed_next() {
        let (_dir, mut seq) = active(&[
            line("capped", 28.0, 8.84),
            line("capped", 28.0, 0.0),
            line("uncapped", 1.0, 0.0),
        ]);

        let first = seq.get_run(&Selector::new("capped")).expect("first run");
        assert!(first.is_kind("capped"));
        assert!(!first.end_of_stream);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].sum_false_positive, 8.84);
        assert_eq!(first.records[1].sum_false_positive, 0.0);

        let second = seq.get_run(&Selector::new("uncapped")).expect("second run");
        assert!(second.is_kind("uncapped"));
        assert!(second.end_of_stream);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].sum_true_positive, 1.0);
    }

    #[test]
    fn end_of_stream_stays_terminal() {
        let (_dir, mut seq) = active(&[line("capped", 1.0, 0.0)]);
        let selector = Selector::new("capped");
        let run = seq.get_run(&selector).expect("run");
        assert!(run.end_of_stream);
        assert_eq!(run.records.len(), 1);
        for _ in 0..3 {
            let again = seq.get_run(&selector).expect("after eof");
            assert!(again.end_of_stream);
            assert!(again.is_empty());
            assert_eq!(again.kind, None);
        }
    }

    #[test]
    fn malformed_line_is_skipped_and_counted() {
        let (_dir, mut seq) = active(&[
            line("capped", 1.0, 0.0),
            "{\"message\":\"thing to grep for\",\"kind\":\"capped\",".to_string(),
            line("capped", 2.0, 0.0),
        ]);
        let run = seq.get_run(&Selector::new("capped")).expect("run");
        assert_eq!(run.records.len(), 2);
        assert_eq!(run.records[1].sum_true_positive, 2.0);
        assert_eq!(seq.stats().malformed, 1);
    }

    #[test]
    fn lines_without_marker_are_filtered_before_parsing() {
        let (_dir, mut seq) = active(&[
            r#"{"level":"INFO","message":"server listening","kind":"uncapped"}"#.to_string(),
            line("capped", 1.0, 0.0),
            "plain text noise".to_string(),
            line("capped", 2.0, 0.0),
        ]);
        let run = seq.get_run(&Selector::new("capped")).expect("run");
        assert_eq!(run.records.len(), 2);
        assert!(run.end_of_stream);
        assert_eq!(
            seq.stats(),
            ReplayStats {
                lines_read: 4,
                filtered_out: 2,
                malformed: 0,
                emitted: 2,
                runs: 1,
            }
        );
    }

    #[test]
    fn custom_marker_and_kind_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_replay(
            dir.path(),
            &[
                r#"{"message":"retention signal","distribution":"a"}"#.to_string(),
                r#"{"message":"retention signal","distribution":"b"}"#.to_string(),
            ],
        );
        let mut seq = ReplaySequencer::with_kind_field("distribution");
        seq.activate(&path).expect("activate");
        let selector = Selector::new("a").with_marker("retention signal");
        assert!(seq.get_run(&selector).expect("a").is_kind("a"));
        assert!(seq.get_run(&selector).expect("b").is_kind("b"));
    }

    #[test]
    fn pushed_back_line_is_not_counted_twice() {
        let (_dir, mut seq) = active(&[line("capped", 1.0, 0.0), line("uncapped", 1.0, 0.0)]);
        let selector = Selector::new("capped");
        seq.get_run(&selector).expect("first");
        seq.get_run(&selector).expect("second");
        assert_eq!(seq.stats().lines_read, 2);
        assert_eq!(seq.stats().emitted, 2);
        assert_eq!(seq.stats().runs, 2);
    }

    #[test]
    fn boundary_line_survives_a_marker_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_replay(
            dir.path(),
            &[
                r#"{"message":"alpha","kind":"a"}"#.to_string(),
                r#"{"message":"alpha","kind":"b"}"#.to_string(),
            ],
        );
        let mut seq = ReplaySequencer::new();
        seq.activate(&path).expect("activate");

        let first = seq
            .get_run(&Selector::new("a").with_marker("alpha"))
            .expect("first");
        assert!(first.is_kind("a"));
        let second = seq
            .get_run(&Selector::new("b").with_marker("beta"))
            .expect("second");
        assert!(second.is_kind("b"));
        assert_eq!(second.records.len(), 1);
        assert!(second.end_of_stream);
        assert_eq!(seq.stats().filtered_out, 0);
        assert_eq!(seq.stats().emitted, 2);
    }

    #[test]
    fn malformed_line_warning_names_its_line_number() {
        let (_dir, mut seq) = active(&[
            line("capped", 1.0, 0.0),
            "{\"message\":\"thing to grep for\",\"kind\":\"capped\",".to_string(),
            line("capped", 2.0, 0.0),
        ]);
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || CapturedLogs(sink.clone()))
            .finish();

        let run = tracing::subscriber::with_default(subscriber, || {
            seq.get_run(&Selector::new("capped")).expect("run")
        });
        assert_eq!(run.records.len(), 2);

        let logs = String::from_utf8(buf.lock().expect("logs lock").clone()).expect("utf8");
        let warnings = logs
            .lines()
            .filter(|l| l.contains("skipping replay line"))
            .collect::<Vec<_>>();
        assert_eq!(warnings.len(), 1, "logs: {logs}");
        assert!(warnings[0].contains("\"level\":\"WARN\""));
        assert!(warnings[0].contains("\"line_number\":2"));
        assert!(warnings[0].contains("invalid json"));
    }

    #[test]
    fn get_run_requires_activation() {
        let mut seq = ReplaySequencer::new();
        let err = seq.get_run(&Selector::new("capped")).expect_err("inactive");
        assert!(matches!(err, ReplayError::NotActive));
    }

    #[test]
    fn failed_activation_leaves_sequencer_inactive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut seq = ReplaySequencer::new();
        let err = seq
            .activate(dir.path().join("absent.file"))
            .expect_err("missing file");
        assert!(matches!(err, ReplayError::FileNotFound(_)));
        assert!(!seq.is_active());

        let path = write_replay(dir.path(), &[line("capped", 1.0, 0.0)]);
        seq.activate(&path).expect("activate after failure");
        assert!(seq.is_active());
    }

    #[test]
    fn activating_twice_is_rejected() {
        let (dir, mut seq) = active(&[line("capped", 1.0, 0.0)]);
        let err = seq
            .activate(dir.path().join("replay.log"))
            .expect_err("already active");
        assert!(matches!(err, ReplayError::AlreadyActive(_)));
        assert!(seq.is_active());
    }

    #[test]
    fn deactivate_closes_and_allows_reactivation() {
        let (dir, mut seq) = active(&[line("capped", 1.0, 0.0)]);
        seq.get_run(&Selector::new("capped")).expect("run");
        seq.deactivate();
        seq.deactivate();
        assert!(!seq.is_active());
        assert!(matches!(
            seq.get_run(&Selector::new("capped")),
            Err(ReplayError::NotActive)
        ));

        seq.activate(dir.path().join("replay.log")).expect("reactivate");
        let run = seq.get_run(&Selector::new("capped")).expect("fresh run");
        assert_eq!(run.records.len(), 1);
    }

    #[test]
    fn cancellation_releases_the_file() {
        let (_dir, mut seq) = active(&[line("capped", 1.0, 0.0), line("capped", 2.0, 0.0)]);
        let (handle, signal) = CancelSignal::new();
        handle.cancel();
        let err = seq
            .get_run_until(&Selector::new("capped"), &signal)
            .expect_err("cancelled");
        assert!(matches!(err, ReplayError::Cancelled));
        assert!(!seq.is_active());
    }

    #[test]
    fn empty_file_is_an_empty_final_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "").expect("write");
        let mut seq = ReplaySequencer::new();
        seq.activate(&path).expect("activate");
        let run = seq.get_run(&Selector::new("capped")).expect("run");
        assert!(run.is_empty());
        assert!(run.end_of_stream);
        assert_eq!(seq.stats().runs, 0);
    }
}
