use serde::Serialize;
use thiserror::Error;

/// Why a field group could not be decoded. The group is skipped; siblings are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DecodeError {
    #[error("sub-message has no payload")]
    MissingPayload,
    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },
    #[error("expected exactly {expected} fields, found {found}")]
    TooManyFields { expected: usize, found: usize },
    #[error("field `{field}` is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("field `{field}` is not finite")]
    NonFinite { field: &'static str },
}
