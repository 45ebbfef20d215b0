//! Prepare, run and parse composed into one call.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use log::info;
use spicier_core::{AnalysisRequest, CanonicalWaveform, ProcessConfig};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::prepare::{PrepareOptions, prepare};
use crate::rawfile::parse_raw_file;
use crate::runner::ProcessRunner;

/// Stages of an external run, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preparing,
    Running,
    Parsing,
}

impl Stage {
    /// Progress fraction reached when the stage starts.
    pub fn fraction(self) -> f64 {
        match self {
            Stage::Preparing => 0.05,
            Stage::Running => 0.2,
            Stage::Parsing => 0.9,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Preparing => "preparing external netlist",
            Stage::Running => "running external simulator",
            Stage::Parsing => "reading simulator results",
        })
    }
}

/// Inputs of one external run.
#[derive(Debug, Clone, Copy)]
pub struct ExternalJob<'a> {
    pub netlist: &'a str,
    /// Path the netlist was loaded from, for relative includes.
    pub source: Option<&'a Path>,
    pub process: &'a ProcessConfig,
    pub request: Option<&'a AnalysisRequest>,
    pub poll_interval: Duration,
}

impl<'a> ExternalJob<'a> {
    pub fn new(netlist: &'a str, process: &'a ProcessConfig) -> Self {
        Self {
            netlist,
            source: None,
            process,
            request: None,
            poll_interval: crate::runner::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_source(mut self, source: Option<&'a Path>) -> Self {
        self.source = source;
        self
    }

    pub fn with_request(mut self, request: Option<&'a AnalysisRequest>) -> Self {
        self.request = request;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Run a netlist on the external simulator and read back its results.
///
/// `on_stage` is called as each stage begins. The preparation workspace is
/// removed when this returns.
pub async fn simulate(
    job: ExternalJob<'_>,
    cancel: &CancellationToken,
    mut on_stage: impl FnMut(Stage),
) -> Result<CanonicalWaveform> {
    on_stage(Stage::Preparing);
    let options = PrepareOptions::default().with_poll_interval(job.poll_interval);
    let prepared = prepare(
        job.netlist,
        job.source,
        job.process,
        job.request,
        &options,
        cancel,
    )
    .await?;

    on_stage(Stage::Running);
    let runner = ProcessRunner::new(&job.process.tools).with_poll_interval(job.poll_interval);
    let output = runner
        .run(
            &prepared.netlist_path,
            &prepared.output_path,
            &prepared.working_directory,
            cancel,
        )
        .await?;

    on_stage(Stage::Parsing);
    let known = prepared.analysis.as_ref().map(AnalysisRequest::kind);
    let waveform = parse_raw_file(&output, known)?;
    info!(
        "external run finished: {} points, {} variables",
        waveform.point_count(),
        waveform.variables.len()
    );
    Ok(waveform)
}
