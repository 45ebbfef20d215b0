//! Shared data model for Spicier simulation jobs.
//!
//! This crate holds everything both execution paths (the in-process engine
//! and the external batch simulator) agree on:
//!
//! - [`AnalysisRequest`] and its SPICE directive form
//! - [`CanonicalWaveform`], the unified result representation
//! - SI unit parsing and engineering-notation formatting
//! - Logical-line utilities for scanning netlist text
//! - [`ProcessConfig`] and external [`ToolPaths`]
//! - Min/max envelope [`decimate`] for display

pub mod analysis;
pub mod config;
pub mod decimate;
pub mod error;
pub mod netlist;
pub mod units;
pub mod waveform;

pub use analysis::{AcScale, AnalysisKind, AnalysisRequest, FrequencySweep, MAX_DC_SWEEP_POINTS};
pub use config::{MODEL_COMPILER_ENV, ProcessConfig, SIMULATOR_ENV, ToolPaths};
pub use decimate::decimate;
pub use error::{Error, Result};
pub use units::{format_engineering, parse_value};
pub use waveform::{
    CanonicalWaveform, QuantityKind, SweepDescriptor, VariableDescriptor, WaveformData,
};

/// Re-export of num_complex's complex type used in waveform data.
pub use num_complex::Complex64;
