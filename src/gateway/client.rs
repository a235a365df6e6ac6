use crate::constants::{
    FIELD_ADDRESS1, FIELD_ADDRESS2, FIELD_CITY, FIELD_COMPANY, FIELD_COUNTRY, FIELD_EMAIL, FIELD_FIRSTNAME,
    FIELD_LASTNAME, FIELD_NOTES, FIELD_PASSWORD, FIELD_PHONENUMBER, FIELD_POSTCODE, FIELD_STATE,
};
use crate::reader::Record;
use crate::validation::Document;

/// A validated record ready for the create call, in the local schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewClient {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub phonenumber: Option<String>,
    pub password: Option<String>,
    pub notes: Option<String>,
    pub document: Option<Document>,
}

impl NewClient {
    /// Copies the recognized fields of a record; values are trimmed and blank
    /// values become `None`.
    pub fn from_record(record: &Record, document: Option<Document>) -> Self {
        let opt = |field: &str| record.get_trimmed(field).map(str::to_string);
        Self {
            firstname: opt(FIELD_FIRSTNAME).unwrap_or_default(),
            lastname: opt(FIELD_LASTNAME).unwrap_or_default(),
            email: opt(FIELD_EMAIL).unwrap_or_default(),
            company: opt(FIELD_COMPANY),
            address1: opt(FIELD_ADDRESS1),
            address2: opt(FIELD_ADDRESS2),
            city: opt(FIELD_CITY),
            state: opt(FIELD_STATE),
            postcode: opt(FIELD_POSTCODE),
            country: opt(FIELD_COUNTRY),
            phonenumber: opt(FIELD_PHONENUMBER),
            password: opt(FIELD_PASSWORD),
            notes: opt(FIELD_NOTES),
            document,
        }
    }

    /// Fills country and notes when the file left them blank.
    pub fn with_defaults(mut self, country: Option<&str>, notes: Option<&str>) -> Self {
        if self.country.is_none() {
            self.country = country.map(str::to_string);
        }
        if self.notes.is_none() {
            self.notes = notes.map(str::to_string);
        }
        self
    }

    /// Field pairs in the remote schema. Password and document are handled by
    /// the gateway.
    pub(crate) fn remote_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![
            ("firstname", self.firstname.as_str()),
            ("lastname", self.lastname.as_str()),
            ("email", self.email.as_str()),
        ];
        let optional = [
            ("companyname", &self.company),
            ("address1", &self.address1),
            ("address2", &self.address2),
            ("city", &self.city),
            ("state", &self.state),
            ("postcode", &self.postcode),
            ("country", &self.country),
            ("phonenumber", &self.phonenumber),
            ("notes", &self.notes),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.as_deref().map(|v| (name, v))),
        );
        fields
    }
}
