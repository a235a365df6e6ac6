//! Brazilian taxpayer identifiers: CPF (individuals, 11 digits) and CNPJ
//! (legal entities, 14 digits), both protected by two mod-11 check digits.
//!
//! An invalid document never fails a record; callers simply omit it.

use std::fmt;

use crate::constants::DOCUMENT_FIELD_ALIASES;
use crate::reader::Record;

/// CNPJ weights for the first check digit; the second pass prepends 6.
const ENTITY_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Individual,
    Entity,
}

impl DocumentKind {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Individual => "CPF",
            DocumentKind::Entity => "CNPJ",
        }
    }
}

/// A validated document in digits-only form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    kind: DocumentKind,
    digits: String,
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Conventional punctuation: `000.000.000-00` or `00.000.000/0000-00`.
    pub fn formatted(&self) -> String {
        let d = &self.digits;
        match self.kind {
            DocumentKind::Individual => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
            DocumentKind::Entity => format!(
                "{}.{}.{}/{}-{}",
                &d[0..2],
                &d[2..5],
                &d[5..8],
                &d[8..12],
                &d[12..14]
            ),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.digits)
    }
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Normalizes and validates a raw identifier. `None` when the digit count is
/// neither 11 nor 14, all digits are equal, or a check digit is wrong.
pub fn normalize(raw: &str) -> Option<Document> {
    let digits = digits_only(raw);
    let kind = match digits.len() {
        11 if is_valid_individual(&digits) => DocumentKind::Individual,
        14 if is_valid_entity(&digits) => DocumentKind::Entity,
        _ => return None,
    };
    Some(Document { kind, digits })
}

pub fn is_valid_individual(digits: &str) -> bool {
    let Some(d) = to_digits(digits, 11) else {
        return false;
    };
    let first = check_digit(d[..9].iter().zip((2..=10).rev()));
    let second = check_digit(d[..9].iter().chain([first].iter()).zip((2..=11).rev()));
    d[9] == first && d[10] == second
}

pub fn is_valid_entity(digits: &str) -> bool {
    let Some(d) = to_digits(digits, 14) else {
        return false;
    };
    let first = check_digit(d[..12].iter().zip(ENTITY_WEIGHTS));
    let second_weights = std::iter::once(6).chain(ENTITY_WEIGHTS);
    let second = check_digit(d[..12].iter().chain([first].iter()).zip(second_weights));
    d[12] == first && d[13] == second
}

/// Returns the first alias column holding a non-empty value, with that value.
pub fn find_document_field(record: &Record) -> Option<(&'static str, &str)> {
    DOCUMENT_FIELD_ALIASES
        .iter()
        .find_map(|alias| record.get_trimmed(alias).map(|value| (*alias, value)))
}

fn to_digits(s: &str, len: usize) -> Option<Vec<u32>> {
    if s.len() != len {
        return None;
    }
    let d: Vec<u32> = s.chars().map(|c| c.to_digit(10)).collect::<Option<_>>()?;
    if d.iter().all(|x| *x == d[0]) {
        return None;
    }
    Some(d)
}

fn check_digit<'a>(weighted: impl Iterator<Item = (&'a u32, u32)>) -> u32 {
    let sum: u32 = weighted.map(|(digit, weight)| digit * weight).sum();
    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}
