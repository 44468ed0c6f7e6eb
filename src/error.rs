//! Error types surfaced by the tax engine core.
//!
//! Every other failure mode (missing price, missing dividend, unknown
//! security in a map) degrades gracefully to zero or a skipped iteration
//! instead of raising — see the allocator in [`crate::allocator`] for the
//! one place that swallows [`EngineError::NoValidEntry`] on purpose.

use thiserror::Error;

/// Fatal errors raised by the engine core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A tax parameter name has no entry in the parameter table at all.
    #[error("unknown tax parameter: {0}")]
    UnknownParameter(String),

    /// A tax parameter exists but has no entry for any year <= the requested year.
    #[error("no valid entry for parameter '{param}' in or before year {year}")]
    NoValidEntry { param: String, year: i32 },

    /// A sell (or simulated sell) requested more units than a ledger holds.
    #[error("insufficient units: requested {requested}, available {available}")]
    InsufficientUnits {
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    /// Raised by the JSON-ingest boundary (the CLI's stand-in parser) when a
    /// date string does not match one of the accepted formats.
    #[error("unparseable date: {0}")]
    UnparseableDate(String),

    /// Raised by the JSON-ingest boundary when a monetary or unit amount
    /// cannot be parsed as a decimal.
    #[error("malformed amount: {0}")]
    MalformedAmount(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
