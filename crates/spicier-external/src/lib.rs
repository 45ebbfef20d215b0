//! External batch simulator fallback for Spicier.
//!
//! Netlists using device models the in-process engine cannot evaluate are
//! run on ngspice instead:
//!
//! - [`detect`] decides whether a netlist needs the external simulator
//! - [`prepare`] rewrites it into a self-contained netlist, compiling
//!   Verilog-A sources with OpenVAF along the way
//! - [`runner`] supervises the ngspice process under a cancellation token
//! - [`rawfile`] reads the results back as a [`CanonicalWaveform`]
//!
//! [`simulate`] runs the whole sequence.
//!
//! [`CanonicalWaveform`]: spicier_core::CanonicalWaveform

pub mod compile;
pub mod detect;
pub mod error;
pub mod paths;
pub mod pipeline;
pub mod prepare;
pub mod rawfile;
pub mod runner;

pub use compile::{ModelCompiler, is_model_compiler_available};
pub use detect::{
    DetectorConfig, ExternalReason, ModelSupport, detect_model_support, requires_external,
};
pub use error::{Error, RawParseError, Result};
pub use pipeline::{ExternalJob, Stage, simulate};
pub use prepare::{PrepareOptions, PreparedExternalNetlist, prepare};
pub use rawfile::{RawHeader, RawVariable, parse_raw, parse_raw_file};
pub use runner::{ProcessRunner, is_simulator_available, simulator_version};

/// Re-export of the cancellation token type used by every async entry point.
pub use tokio_util::sync::CancellationToken;
