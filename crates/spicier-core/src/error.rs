//! Error types for spicier-core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A waveform row does not match the declared variable count.
    #[error("row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// Sweep axis and data rows disagree in length.
    #[error("sweep has {sweep} values but data has {rows} rows")]
    SweepLength { sweep: usize, rows: usize },

    /// Appending a row of the wrong numeric domain (real vs complex).
    #[error("cannot append {0} row to waveform")]
    DomainMismatch(&'static str),

    /// An analysis request violates its invariants.
    #[error("invalid analysis request: {0}")]
    InvalidRequest(String),

    /// A directive line could not be interpreted.
    #[error("invalid directive `{line}`: {reason}")]
    InvalidDirective { line: String, reason: String },

    /// A numeric value with optional SI suffix could not be parsed.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, Error>;
