//! Job orchestration for Spicier.
//!
//! An [`Orchestrator`] accepts netlists with an optional
//! [`AnalysisRequest`](spicier_core::AnalysisRequest) and runs each as an
//! asynchronous job. Jobs are routed either to an in-process
//! [`SimulationEngine`] or to the external batch simulator, and every job
//! reports through the same [`LifecycleEvent`] stream:
//!
//! ```text
//! Started -> (Progress | WaveformUpdate)* -> Completed | Failed | Cancelled
//! ```
//!
//! Transient analyses stream partial waveforms while they run.

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod streaming;

pub use config::OrchestratorConfig;
pub use convert::{DcSweepCollector, to_waveform};
pub use engine::{EngineError, EngineOutput, RunContext, SimulationEngine, Unknown};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventHub, JobEvents, LifecycleEvent};
pub use job::{ExperimentId, JobId, JobSnapshot, JobStatus, Route};
pub use orchestrator::{JobHandle, Orchestrator, SubmitRequest};
pub use streaming::{Batch, IncrementalResultBuilder, StreamingChannel};

pub use tokio_util::sync::CancellationToken;
