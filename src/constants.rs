//! Field names and remote API constants shared across the importer.
//! CSV header names are the local schema; the remote schema names live next to
//! the gateway mapping.

// Required CSV fields
pub const FIELD_FIRSTNAME: &str = "firstname";
pub const FIELD_LASTNAME: &str = "lastname";
pub const FIELD_EMAIL: &str = "email";

// Optional CSV fields
pub const FIELD_COMPANY: &str = "company";
pub const FIELD_ADDRESS1: &str = "address1";
pub const FIELD_ADDRESS2: &str = "address2";
pub const FIELD_CITY: &str = "city";
pub const FIELD_STATE: &str = "state";
pub const FIELD_POSTCODE: &str = "postcode";
pub const FIELD_COUNTRY: &str = "country";
pub const FIELD_PHONENUMBER: &str = "phonenumber";
pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_NOTES: &str = "notes";

pub const REQUIRED_FIELDS: [&str; 3] = [FIELD_FIRSTNAME, FIELD_LASTNAME, FIELD_EMAIL];

/// Tax-ID column aliases in lookup priority order. The first alias present
/// with a non-empty value wins.
pub const DOCUMENT_FIELD_ALIASES: [&str; 5] = ["cnpj", "cpf_cnpj", "documento", "cpfcnpj", "document"];

// Remote RPC actions
pub const ACTION_GET_CLIENTS: &str = "GetClients";
pub const ACTION_ADD_CLIENT: &str = "AddClient";

// Remote RPC fixed fields
pub const RESPONSE_TYPE_JSON: &str = "json";
pub const RESULT_ERROR: &str = "error";

/// Placeholder used in result details when a row has no usable email.
pub const EMAIL_UNAVAILABLE: &str = "N/A";

// Defaults
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_THROTTLE_MS: u64 = 500;
pub const DEFAULT_PASSWORD_LENGTH: usize = 12;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const DEFAULT_CUSTOM_FIELD_SLOT: u32 = 1;
pub const DEFAULT_COUNTRY: &str = "BR";
pub const DEFAULT_NOTES: &str = "Imported via CSV batch";
