//! # Error Types
//!
//! Errors raised while building or interpreting core values. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! Guard rejections live in `tally-guard`; these are the lower-level
//! failures underneath them (a date that does not parse, a payload that is
//! not an object, a checksum input containing a float).

use thiserror::Error;

/// Top-level error type for core value handling.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// A date or timestamp could not be parsed.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// A monetary amount could not be parsed as a decimal.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A write payload had an unexpected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// An entity name does not match any known table.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be decimal strings or integers.
    #[error("float values are not permitted in canonical representations; use a decimal string for amount: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
