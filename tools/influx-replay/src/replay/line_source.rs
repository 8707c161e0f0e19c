//! Forward-only line reader with a single pushback slot.

use crate::errors::ReplayError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub struct LineSource {
    reader: Option<Box<dyn BufRead + Send>>,
    origin: PathBuf,
    pending: Option<String>,
    exhausted: bool,
    line_number: u64,
}

impl LineSource {
    /// Open `path` for reading. Fails immediately; there is no retry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ReplayError::from_open(path, e))?;
        let mut source = Self::from_reader(BufReader::new(file));
        source.origin = path.to_path_buf();
        Ok(source)
    }

    pub fn from_reader(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            origin: PathBuf::from("<reader>"),
            pending: None,
            exhausted: false,
            line_number: 0,
        }
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Lines consumed from the underlying reader. Pushback does not rewind it.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Next line without its terminator, or `None` once the input is exhausted.
    ///
    /// A pushed-back line is always returned before any further read. After
    /// `None` (or an I/O error) every later call returns `None`.
    pub fn next_line(&mut self) -> Result<Option<String>, ReplayError> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        if self.exhausted {
            return Ok(None);
        }
        let Some(reader) = self.reader.as_mut() else {
            self.exhausted = true;
            return Ok(None);
        };

        let mut buf = Vec::new();
        let read = match reader.read_until(b'\n', &mut buf) {
            Ok(read) => read,
            Err(e) => {
                self.exhausted = true;
                return Err(ReplayError::Io(format!(
                    "{} line {}: {e}",
                    self.origin.display(),
                    self.line_number + 1
                )));
            }
        };
        if read == 0 {
            self.exhausted = true;
            return Ok(None);
        }
        self.line_number += 1;

        let text = String::from_utf8_lossy(&buf);
        Ok(Some(text.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Make `line` the next value returned by [`LineSource::next_line`].
    ///
    /// Only one line may be pending. A second pushback without an intervening
    /// read is a caller bug: it panics in debug builds and replaces the
    /// pending line otherwise.
    pub fn pushback(&mut self, line: String) {
        debug_assert!(
            self.pending.is_none(),
            "pushback called twice without an intervening next_line"
        );
        if let Some(displaced) = self.pending.replace(line) {
            tracing::warn!(displaced = %displaced, "replay pushback overwrote a pending line");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Release the reader. Safe to call more than once.
    pub fn close(&mut self) {
        self.reader = None;
        self.pending = None;
        self.exhausted = true;
    }
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("origin", &self.origin)
            .field("open", &self.is_open())
            .field("pending", &self.pending)
            .field("exhausted", &self.exhausted)
            .field("line_number", &self.line_number)
            .finish()
    }
}
