//! Input sources — line-oriented log files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;

use mongolog_core::errors::SourceError;

/// Lifecycle of one source inside a run.
///
/// Opened → Reading on the first read, Reading → Draining on EOF,
/// Draining → Closed once the worker pool has quiesced for this source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Opened,
    Reading,
    Draining,
    Closed,
}

/// Per-source outcome reported in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub path: PathBuf,
    pub state: SourceState,
    pub lines_read: u64,
    /// Open or read failure, when one occurred.
    pub error: Option<String>,
}

/// One open line-oriented input.
#[derive(Debug)]
pub struct LogSource {
    path: PathBuf,
    reader: BufReader<File>,
    lines_read: u64,
}

impl LogSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            lines_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Read the next line, without the trailing newline. `Ok(None)` is EOF.
    pub fn next_line(&mut self, buf: &mut String) -> Result<Option<()>, SourceError> {
        buf.clear();
        let n = self
            .reader
            .read_line(buf)
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                line: self.lines_read + 1,
                source,
            })?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(()))
    }
}
