//! Pure record checks; no file or network access.

pub mod document;
pub mod record;

pub use document::{Document, DocumentKind};
pub use record::{validate, Rule, ValidationError};
