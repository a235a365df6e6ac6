//! Streaming reader for delimited client files.
//!
//! The first record is the header; every following record must carry the same
//! number of fields. How a mismatch is reported depends on [`ReadMode`]:
//! strict reads fail with [`ReaderError::ColumnMismatch`], lenient reads hand
//! the fault back as [`Row::Malformed`] and keep going.

mod record;

pub use record::{Header, Record};

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ByteRecord, StringRecord};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unable to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("header line is missing or empty")]
    EmptyHeader,

    #[error("duplicate header field '{0}'")]
    DuplicateHeader(String),

    #[error("line {line}: column count {found} does not match header ({expected})")]
    ColumnMismatch { line: u64, expected: usize, found: usize },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
}

/// Delimiter, quote and escape bytes. Only the comma/double-quote/backslash
/// triple is used by the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: u8,
}

impl Default for Dialect {
    fn default() -> Self {
        Self { delimiter: b',', quote: b'"', escape: b'\\' }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// A structurally broken line aborts the read.
    Strict,
    /// A structurally broken line is returned as a fault and reading continues.
    Lenient,
}

/// Position of the next unread data record; enough to resume a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowPosition {
    pub index: u64,
    pub line: u64,
    pub byte: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFaultKind {
    ColumnMismatch { expected: usize, found: usize },
    InvalidEncoding,
}

/// A data line that could not be mapped onto the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFault {
    pub line: u64,
    pub index: u64,
    pub kind: RowFaultKind,
}

impl fmt::Display for RowFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RowFaultKind::ColumnMismatch { expected, found } => {
                write!(f, "column count {} does not match header ({})", found, expected)
            }
            RowFaultKind::InvalidEncoding => write!(f, "line is not valid UTF-8"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Row {
    Record(Record),
    Malformed(RowFault),
}

impl Row {
    pub fn line(&self) -> u64 {
        match self {
            Row::Record(r) => r.line(),
            Row::Malformed(f) => f.line,
        }
    }
}

pub struct TabularReader {
    inner: csv::Reader<File>,
    header: Arc<Header>,
    mode: ReadMode,
    data_start: RowPosition,
    next: RowPosition,
    buf: StringRecord,
}

impl TabularReader {
    /// Opens `path` and reads its header line.
    pub fn open(path: &Path, dialect: Dialect, mode: ReadMode) -> Result<Self, ReaderError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ReaderError::FileNotFound(path.to_path_buf()),
            _ => ReaderError::Unreadable { path: path.to_path_buf(), source: e },
        })?;

        let mut inner = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .escape(Some(dialect.escape))
            .double_quote(true)
            .from_reader(file);

        let mut first = StringRecord::new();
        let has_first = inner.read_record(&mut first).map_err(|e| {
            let unreadable = matches!(e.kind(), csv::ErrorKind::Io(_) | csv::ErrorKind::Utf8 { .. });
            if unreadable {
                ReaderError::Unreadable {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
                }
            } else {
                ReaderError::Csv(e)
            }
        })?;
        if !has_first {
            return Err(ReaderError::EmptyHeader);
        }
        let header = Header::new(first.iter())?;

        let pos = inner.position();
        let data_start = RowPosition { index: 0, line: pos.line(), byte: pos.byte() };
        debug!(path = %path.display(), fields = header.len(), "opened tabular file");

        Ok(Self {
            inner,
            header: Arc::new(header),
            mode,
            data_start,
            next: data_start,
            buf: StringRecord::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Position of the next unread data record.
    pub fn position(&self) -> RowPosition {
        self.next
    }

    /// Reads the next data record. `Ok(None)` marks the end of the stream.
    pub fn next_row(&mut self) -> Result<Option<Row>, ReaderError> {
        let index = self.next.index;
        let read = self.inner.read_record(&mut self.buf);
        let row = match read {
            Ok(false) => return Ok(None),
            Ok(true) => {
                let line = self.buf.position().map(|p| p.line()).unwrap_or(self.next.line);
                let found = self.buf.len();
                let expected = self.header.len();
                if found == expected {
                    let values = self.buf.iter().map(str::to_string).collect();
                    Row::Record(Record::new(line, index, Arc::clone(&self.header), values))
                } else if self.mode == ReadMode::Strict {
                    // The bad line is consumed; the next read starts after it.
                    self.advance();
                    return Err(ReaderError::ColumnMismatch { line, expected, found });
                } else {
                    Row::Malformed(RowFault {
                        line,
                        index,
                        kind: RowFaultKind::ColumnMismatch { expected, found },
                    })
                }
            }
            Err(e) => {
                let bad_line = match e.kind() {
                    csv::ErrorKind::Utf8 { pos, .. } => {
                        Some(pos.as_ref().map(|p| p.line()).unwrap_or(self.next.line))
                    }
                    _ => None,
                };
                match bad_line {
                    Some(line) if self.mode == ReadMode::Lenient => {
                        Row::Malformed(RowFault { line, index, kind: RowFaultKind::InvalidEncoding })
                    }
                    Some(_) => {
                        self.advance();
                        return Err(ReaderError::Csv(e));
                    }
                    None => return Err(ReaderError::Csv(e)),
                }
            }
        };

        self.advance();
        Ok(Some(row))
    }

    /// Skips up to `n` data records without decoding them; returns how many
    /// were skipped.
    pub fn skip(&mut self, n: u64) -> Result<u64, ReaderError> {
        let mut raw = ByteRecord::new();
        let mut skipped = 0;
        while skipped < n && self.inner.read_byte_record(&mut raw)? {
            skipped += 1;
            self.advance();
        }
        Ok(skipped)
    }

    /// Whether any data record is left, without consuming it.
    pub fn at_end(&mut self) -> Result<bool, ReaderError> {
        let saved = self.next;
        let mut raw = ByteRecord::new();
        if self.inner.read_byte_record(&mut raw)? {
            self.seek(saved)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Moves to a position previously returned by [`TabularReader::position`].
    pub fn seek(&mut self, to: RowPosition) -> Result<(), ReaderError> {
        let mut pos = csv::Position::new();
        // Record numbers count the header as record 0.
        pos.set_byte(to.byte).set_line(to.line).set_record(to.index + 1);
        self.inner.seek(pos)?;
        self.next = to;
        Ok(())
    }

    /// Rewinds to the first data line.
    pub fn reset(&mut self) -> Result<(), ReaderError> {
        self.seek(self.data_start)
    }

    fn advance(&mut self) {
        let pos = self.inner.position();
        self.next = RowPosition { index: self.next.index + 1, line: pos.line(), byte: pos.byte() };
    }
}
