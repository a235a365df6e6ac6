use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::constants::{FIELD_COUNTRY, FIELD_EMAIL, REQUIRED_FIELDS};
use crate::reader::Record;

// Dot-separated atext local part, LDH domain labels and an alphabetic TLD.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
    )
    .expect("email regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    EmailFormat,
    CountryCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub line: u64,
    pub field: String,
    pub rule: Rule,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Checks one record against the required-field, email and country rules.
/// An empty result means the record may be dispatched.
pub fn validate(record: &Record) -> Vec<ValidationError> {
    let line = record.line();
    let mut errors = Vec::new();

    for field in REQUIRED_FIELDS {
        if record.get_trimmed(field).is_none() {
            errors.push(ValidationError {
                line,
                field: field.to_string(),
                rule: Rule::Required,
                message: format!("required field '{}' is empty", field),
            });
        }
    }

    if let Some(email) = record.get_trimmed(FIELD_EMAIL) {
        if !is_valid_email(email) {
            errors.push(ValidationError {
                line,
                field: FIELD_EMAIL.to_string(),
                rule: Rule::EmailFormat,
                message: format!("invalid email '{}'", email),
            });
        }
    }

    if let Some(country) = record.get_trimmed(FIELD_COUNTRY) {
        if country.chars().count() != 2 {
            errors.push(ValidationError {
                line,
                field: FIELD_COUNTRY.to_string(),
                rule: Rule::CountryCode,
                message: format!("invalid country code '{}' (must be 2 letters)", country),
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        Record::from_pairs(5, pairs).unwrap()
    }

    #[test]
    fn complete_record_passes() {
        let r = record(&[
            ("firstname", "Ana"),
            ("lastname", "Silva"),
            ("email", "ana@example.com"),
            ("country", "BR"),
        ]);
        assert!(validate(&r).is_empty());
    }

    #[test]
    fn one_error_per_missing_required_field() {
        let r = record(&[("firstname", " "), ("email", "")]);
        let errors = validate(&r);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.rule == Rule::Required && e.line == 5));
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["firstname", "lastname", "email"]);
    }

    #[test]
    fn malformed_email_is_reported() {
        let r = record(&[("firstname", "Ana"), ("lastname", "Silva"), ("email", "not-an-email")]);
        let errors = validate(&r);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, Rule::EmailFormat);
        assert!(errors[0].message.contains("invalid email"));
    }

    #[test]
    fn country_must_have_two_characters() {
        let base = [("firstname", "Ana"), ("lastname", "Silva"), ("email", "ana@example.com")];
        let mut with_bad = base.to_vec();
        with_bad.push(("country", "BRA"));
        let errors = validate(&record(&with_bad));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule, Rule::CountryCode);

        let mut with_blank = base.to_vec();
        with_blank.push(("country", ""));
        assert!(validate(&record(&with_blank)).is_empty());
    }

    #[test]
    fn email_grammar() {
        for ok in ["a@b.co", "first.last+tag@sub.example.com.br", "x_y@domain-name.org"] {
            assert!(is_valid_email(ok), "{} should be valid", ok);
        }
        for bad in ["plain", "a@b", "@example.com", "a..b@example.com", ".a@example.com", "a@-x.com", "a b@example.com", "a@example.c"] {
            assert!(!is_valid_email(bad), "{} should be invalid", bad);
        }
    }
}
