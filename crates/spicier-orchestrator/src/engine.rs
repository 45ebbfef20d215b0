//! The in-process simulation engine seam.
//!
//! The orchestrator never looks inside the solver. It drives an engine
//! through four preparation stages (parse, lower, compile, bind) and then
//! asks it to run analyses on the bound system. Every stage may fail, and
//! [`SimulationEngine::run_analysis`] polls a cancellation token between
//! solver steps.

use std::path::Path;

use num_complex::Complex64;
use spicier_core::{AnalysisRequest, ProcessConfig, QuantityKind};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure reported by an engine stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),
    /// The stage observed the cancellation token and stopped.
    #[error("cancelled")]
    Cancelled,
}

/// One entry of the solution vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Unknown {
    /// Output name such as `v(out)` or `i(v1)`.
    pub name: String,
    pub kind: QuantityKind,
}

impl Unknown {
    pub fn voltage(node: &str) -> Self {
        Self {
            name: format!("v({})", node),
            kind: QuantityKind::Voltage,
        }
    }

    pub fn current(branch: &str) -> Self {
        Self {
            name: format!("i({})", branch),
            kind: QuantityKind::Current,
        }
    }
}

/// Native result of one analysis run.
///
/// Solution vectors are indexed like [`SimulationEngine::unknowns`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    OperatingPoint {
        solution: Vec<f64>,
    },
    /// Accepted timepoints. Engines that stream every step through
    /// [`RunContext::step`] may return an empty list here.
    Transient {
        times: Vec<f64>,
        solutions: Vec<Vec<f64>>,
    },
    Ac {
        frequencies: Vec<f64>,
        solutions: Vec<Vec<Complex64>>,
    },
    /// Output and input-referred noise spectral densities.
    Noise {
        frequencies: Vec<f64>,
        output_noise: Vec<f64>,
        input_noise: Vec<f64>,
    },
    TransferFunction {
        gain: f64,
        input_impedance: f64,
        output_impedance: f64,
    },
    PoleZero {
        poles: Vec<Complex64>,
        zeros: Vec<Complex64>,
    },
}

/// Per-run hooks handed to the engine.
pub struct RunContext<'a> {
    cancel: &'a CancellationToken,
    on_step: Option<&'a mut dyn FnMut(f64, &[f64])>,
}

impl<'a> RunContext<'a> {
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            cancel,
            on_step: None,
        }
    }

    pub fn with_step_callback(mut self, on_step: &'a mut dyn FnMut(f64, &[f64])) -> Self {
        self.on_step = Some(on_step);
        self
    }

    /// Whether the job has been cancelled. Engines check this between steps.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once the job is cancelled, for use with `?`.
    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Report an accepted transient timestep.
    pub fn step(&mut self, time: f64, solution: &[f64]) {
        if let Some(on_step) = self.on_step.as_deref_mut() {
            on_step(time, solution);
        }
    }
}

/// An in-process circuit solver.
///
/// Stages run on blocking worker threads, so implementations are free to
/// do heavy synchronous work.
pub trait SimulationEngine: Send + Sync + 'static {
    type Parsed: Send + 'static;
    type Lowered: Send + 'static;
    type Compiled: Send + 'static;
    type System: Send + 'static;

    fn parse(&self, netlist: &str, source: Option<&Path>) -> Result<Self::Parsed, EngineError>;

    fn lower(
        &self,
        parsed: Self::Parsed,
        process: &ProcessConfig,
    ) -> Result<Self::Lowered, EngineError>;

    fn compile(&self, lowered: Self::Lowered) -> Result<Self::Compiled, EngineError>;

    fn bind_devices(&self, compiled: Self::Compiled) -> Result<Self::System, EngineError>;

    /// Names and kinds of the solution vector entries.
    fn unknowns(&self, system: &Self::System) -> Vec<Unknown>;

    /// Rebind an independent source's DC value for the next run.
    fn set_source_value(
        &self,
        system: &mut Self::System,
        source: &str,
        value: f64,
    ) -> Result<(), EngineError>;

    fn run_analysis(
        &self,
        system: &mut Self::System,
        request: &AnalysisRequest,
        ctx: &mut RunContext<'_>,
    ) -> Result<EngineOutput, EngineError>;
}
