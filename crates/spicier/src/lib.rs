//! # Spicier
//!
//! Simulation job orchestration for SPICE netlists.
//!
//! Spicier sits between a circuit solver and whoever consumes its results:
//! - jobs run asynchronously and report through one lifecycle event stream
//! - transient runs stream partial waveforms while they are computed
//! - every job can be cancelled cooperatively
//! - netlists using models the in-process solver cannot evaluate are run on
//!   ngspice instead, with Verilog-A sources compiled through OpenVAF
//!
//! Both paths produce the same [`CanonicalWaveform`].
//!
//! ## Quick Start
//!
//! ```rust
//! use spicier::prelude::*;
//!
//! let netlist = "RC\nV1 in 0 PULSE(0 1 0 1n 1n 1u 2u)\nR1 in out 1k\nC1 out 0 1n\n.tran 10n 2u\n.end\n";
//!
//! let analysis = AnalysisRequest::first_in_netlist(netlist).unwrap();
//! assert_eq!(analysis.kind(), AnalysisKind::Transient);
//! assert_eq!(analysis.to_directive(), ".tran 10n 2u");
//!
//! let process = ProcessConfig::default();
//! assert!(!spicier::requires_external(netlist, None, &process));
//! ```
//!
//! ## Running Jobs
//!
//! ```rust,ignore
//! use spicier::prelude::*;
//!
//! let orchestrator = Orchestrator::new(my_engine);
//! let handle = orchestrator.submit(SubmitRequest::new(netlist));
//! while let Some(event) = handle.events.next().await {
//!     match event {
//!         LifecycleEvent::WaveformUpdate(partial) => redraw(&partial),
//!         LifecycleEvent::Completed(result) => show(&result),
//!         _ => {}
//!     }
//! }
//! ```

pub use spicier_core as core;
pub use spicier_external as external;
pub use spicier_orchestrator as orchestrator;

// ============================================================================
// Data model
// ============================================================================

pub use spicier_core::{
    AcScale, AnalysisKind, AnalysisRequest, CanonicalWaveform, Complex64,
    // Errors
    Error as CoreError,
    FrequencySweep, ProcessConfig, QuantityKind, SweepDescriptor, ToolPaths, VariableDescriptor,
    WaveformData,
    // Display
    decimate, format_engineering, parse_value,
};

// ============================================================================
// External simulator
// ============================================================================

pub use spicier_external::{
    DetectorConfig,
    // Errors
    Error as ExternalError,
    ExternalJob, ExternalReason, ModelSupport, PrepareOptions, PreparedExternalNetlist,
    RawParseError, Stage, detect_model_support, is_model_compiler_available,
    is_simulator_available, parse_raw, parse_raw_file, prepare, requires_external, simulate,
    simulator_version,
};

// ============================================================================
// Orchestration
// ============================================================================

pub use spicier_orchestrator::{
    CancellationToken, EngineError, EngineOutput,
    // Errors
    Error as OrchestratorError,
    ErrorKind, ExperimentId, JobEvents, JobHandle, JobId, JobSnapshot, JobStatus,
    LifecycleEvent, Orchestrator, OrchestratorConfig, Route, RunContext, SimulationEngine,
    SubmitRequest, Unknown,
};

/// Prelude module containing commonly used types and traits.
///
/// ```rust
/// use spicier::prelude::*;
/// ```
pub mod prelude {
    // Data model
    pub use crate::{
        AnalysisKind, AnalysisRequest, CanonicalWaveform, Complex64, FrequencySweep,
        ProcessConfig, QuantityKind, ToolPaths,
    };

    // Orchestration
    pub use crate::{
        CancellationToken, ErrorKind, JobStatus, LifecycleEvent, Orchestrator,
        OrchestratorConfig, SimulationEngine, SubmitRequest,
    };

    // External simulator
    pub use crate::{ModelSupport, detect_model_support, simulate};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_models_stay_native() {
        let netlist = "Test\nV1 1 0 DC 5\nD1 1 2 dmod\nR1 2 0 1k\n.model dmod d is=1e-14\n.op\n.end\n";
        let support = detect_model_support(
            netlist,
            None,
            &ProcessConfig::default(),
            &DetectorConfig::default(),
        );
        assert_eq!(support, ModelSupport::Native);
    }

    #[test]
    fn test_verilog_a_models_route_external() {
        let netlist = "Test\n.pre_osdi models/bsimcmg.osdi\nN1 d g s b nfin\n.op\n.end\n";
        assert!(requires_external(netlist, None, &ProcessConfig::default()));
    }

    #[tokio::test]
    async fn test_job_through_facade() {
        struct Fixed;

        impl SimulationEngine for Fixed {
            type Parsed = ();
            type Lowered = ();
            type Compiled = ();
            type System = ();

            fn parse(
                &self,
                _netlist: &str,
                _source: Option<&std::path::Path>,
            ) -> Result<(), EngineError> {
                Ok(())
            }
            fn lower(&self, _: (), _: &ProcessConfig) -> Result<(), EngineError> {
                Ok(())
            }
            fn compile(&self, _: ()) -> Result<(), EngineError> {
                Ok(())
            }
            fn bind_devices(&self, _: ()) -> Result<(), EngineError> {
                Ok(())
            }
            fn unknowns(&self, _: &()) -> Vec<Unknown> {
                vec![Unknown::voltage("1")]
            }
            fn set_source_value(&self, _: &mut (), _: &str, _: f64) -> Result<(), EngineError> {
                Ok(())
            }
            fn run_analysis(
                &self,
                _: &mut (),
                _: &AnalysisRequest,
                _: &mut RunContext<'_>,
            ) -> Result<EngineOutput, EngineError> {
                Ok(EngineOutput::OperatingPoint {
                    solution: vec![5.0],
                })
            }
        }

        let orchestrator = Orchestrator::new(Fixed);
        let handle = orchestrator.submit(SubmitRequest::new("Test\nV1 1 0 DC 5\n.op\n.end\n"));
        match handle.events.wait_terminal().await {
            Some(LifecycleEvent::Completed(w)) => {
                assert_eq!(w.real_column(0), Some(vec![5.0]));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
