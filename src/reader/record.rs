use std::collections::HashMap;
use std::sync::Arc;

use super::ReaderError;

/// Ordered, unique field names taken from the first line of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Header {
    /// Builds a header from raw names. Names are trimmed and a leading byte
    /// order mark is dropped from the first one.
    pub fn new<I, S>(raw: I) -> Result<Self, ReaderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = raw
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let name = name.as_ref();
                let name = if i == 0 { name.trim_start_matches('\u{feff}') } else { name };
                name.trim().to_string()
            })
            .collect();

        if names.iter().all(|n| n.is_empty()) {
            return Err(ReaderError::EmptyHeader);
        }

        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if positions.insert(name.clone(), i).is_some() {
                return Err(ReaderError::DuplicateHeader(name.clone()));
            }
        }

        Ok(Self { names, positions })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.positions.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.positions.contains_key(field)
    }
}

/// One data line mapped onto the header.
///
/// `line` is the physical line the record starts on (the header is line 1),
/// `index` the 0-based ordinal among data records.
#[derive(Debug, Clone)]
pub struct Record {
    line: u64,
    index: u64,
    header: Arc<Header>,
    values: Vec<String>,
}

impl Record {
    /// Callers must guarantee `values.len() == header.len()`.
    pub(crate) fn new(line: u64, index: u64, header: Arc<Header>, values: Vec<String>) -> Self {
        debug_assert_eq!(header.len(), values.len());
        Self { line, index, header, values }
    }

    /// Builds a standalone record from field/value pairs, without a file.
    pub fn from_pairs(line: u64, pairs: &[(&str, &str)]) -> Result<Self, ReaderError> {
        let header = Header::new(pairs.iter().map(|(k, _)| *k))?;
        let values = pairs.iter().map(|(_, v)| v.to_string()).collect();
        Ok(Self {
            line,
            index: line.saturating_sub(2),
            header: Arc::new(header),
            values,
        })
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Raw value of a field, `None` when the column is absent.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.header
            .position(field)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Trimmed value of a field, `None` when absent or blank.
    pub fn get_trimmed(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}
