use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Errors raised while parsing, formatting or normalizing byte ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Malformed range item: {0:?}")]
    MalformedItem(String),

    #[error("Malformed range: {0:?}")]
    MalformedRange(String),

    #[error("Unsupported range unit: {0:?}")]
    UnsupportedUnit(String),

    #[error("`*` must be the only item of a range")]
    EntireNotAlone,

    #[error("Inverted range: {from}-{to}")]
    Inverted { from: u64, to: u64 },

    #[error("Range starting at {from} is not satisfiable for length {length}")]
    Unsatisfiable { from: u64, length: u64 },
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Range Error: {0}")]
    Range(#[from] RangeError),

    #[error("Short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead { offset: u64, expected: u64, actual: u64 },

    #[error("Transport Error: {method} {url} returned {status}")]
    Transport {
        method: Method,
        url: String,
        status: StatusCode,
    },

    #[error("Reqwest Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid Header Value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Codec Error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Upload outcome unknown: no item {name:?} found under {parent_id:?}")]
    ReconciliationNotFound { parent_id: String, name: String },

    #[error("Upload cancelled")]
    Cancelled,

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse Error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Configuration Error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, UploadError>;

impl PartialEq for UploadError {
    fn eq(&self, other: &UploadError) -> bool {
        match (self, other) {
            (UploadError::Range(a), UploadError::Range(b)) => a == b,
            (e1, e2) => std::mem::discriminant(e1) == std::mem::discriminant(e2),
        }
    }
}
