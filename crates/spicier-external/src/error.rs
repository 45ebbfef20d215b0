//! Error types for the external simulator path.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result type for external simulator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing, running or reading an external run.
#[derive(Debug, Error)]
pub enum Error {
    /// An include, library or model path could not be resolved.
    #[error("cannot resolve {directive} path `{path}` (line {line})")]
    PathResolution {
        directive: String,
        path: String,
        line: usize,
    },

    /// The behavioral-model compiler exited unsuccessfully.
    #[error("model compiler failed on {source_file} ({status})\n{output}")]
    CompilerFailed {
        source_file: PathBuf,
        status: ExitStatus,
        output: String,
    },

    /// The compiler exited cleanly but the model library is missing.
    #[error("model compiler produced no {expected} for {source_file}\n{output}")]
    CompilerMissingOutput {
        source_file: PathBuf,
        expected: PathBuf,
        output: String,
    },

    /// The simulator exited unsuccessfully.
    #[error("simulator exited with {status}\n{output}")]
    ProcessFailed { status: ExitStatus, output: String },

    /// The simulator exited cleanly without writing its result file.
    #[error("simulator produced no result file {expected}\n{output}")]
    ProcessMissingOutput { expected: PathBuf, output: String },

    /// A tool binary could not be started.
    #[error("cannot start {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The result file could not be parsed.
    #[error(transparent)]
    RawParse(#[from] RawParseError),

    /// The run was cancelled.
    #[error("external run cancelled")]
    Cancelled,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reading a simulator rawfile.
#[derive(Debug, Error, PartialEq)]
pub enum RawParseError {
    /// `No. Points` or `No. Variables` is missing or zero.
    #[error("rawfile header is missing or has zero `{0}`")]
    MissingCount(&'static str),

    /// A header count is not an integer.
    #[error("line {line}: invalid `{field}` value `{value}`")]
    InvalidCount {
        line: usize,
        field: &'static str,
        value: String,
    },

    /// The variable list disagrees with the header.
    #[error("header declares {declared} variables but {listed} are listed")]
    VariableCount { declared: usize, listed: usize },

    /// A `Variables:` entry is malformed.
    #[error("line {line}: malformed variable entry `{text}`")]
    InvalidVariable { line: usize, text: String },

    /// Neither a `Values:` nor a `Binary:` section was found.
    #[error("rawfile has no Values: or Binary: section")]
    MissingData,

    /// The value stream ended early.
    #[error("value stream truncated at point {point}: expected {expected} points")]
    Truncated { point: usize, expected: usize },

    /// A value token is not a number.
    #[error("line {line}: invalid numeric token `{token}`")]
    InvalidNumber { line: usize, token: String },
}
