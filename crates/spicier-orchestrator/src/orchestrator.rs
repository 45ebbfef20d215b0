//! The analysis orchestrator.
//!
//! [`Orchestrator::submit`] registers a job, emits `Started` and spawns the
//! job's pipeline on the Tokio runtime:
//!
//! 1. validate the request
//! 2. route the netlist to the in-process engine or the external simulator
//! 3. in-process: parse, lower, compile and bind on a blocking thread, then
//!    dispatch on the analysis kind; transient runs stream through a
//!    [`StreamingChannel`] drained by a poller task
//! 4. external: prepare, run and parse through [`spicier_external::simulate`]
//! 5. record the outcome and emit exactly one terminal event
//!
//! Cancellation observed before the terminal transition always wins.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use spicier_core::{AnalysisRequest, CanonicalWaveform, ProcessConfig, format_engineering};
use spicier_external::{ExternalJob, ModelSupport, detect_model_support};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::convert::{DcSweepCollector, to_waveform};
use crate::engine::{EngineOutput, RunContext, SimulationEngine, Unknown};
use crate::error::{Error, Result};
use crate::events::{EventHub, JobEvents, LifecycleEvent};
use crate::job::{
    ExperimentId, JobId, JobRecord, JobReporter, JobSnapshot, JobStatus, JobTable, Route,
};
use crate::streaming::{IncrementalResultBuilder, StreamingChannel};

/// Progress reached once the circuit is bound and the analysis starts.
const ANALYSIS_START: f64 = 0.2;
/// Share of the progress bar covered by the analysis itself.
const ANALYSIS_SPAN: f64 = 0.75;

/// Everything needed to run one job.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub experiment: ExperimentId,
    pub netlist: String,
    /// Path the netlist was loaded from, for relative includes.
    pub source: Option<PathBuf>,
    pub process: ProcessConfig,
    /// Analysis to run. Without one the netlist's first analysis directive
    /// is used, falling back to an operating point.
    pub analysis: Option<AnalysisRequest>,
}

impl SubmitRequest {
    pub fn new(netlist: impl Into<String>) -> Self {
        Self {
            experiment: ExperimentId::new(),
            netlist: netlist.into(),
            source: None,
            process: ProcessConfig::default(),
            analysis: None,
        }
    }

    pub fn with_experiment(mut self, experiment: ExperimentId) -> Self {
        self.experiment = experiment;
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_process(mut self, process: ProcessConfig) -> Self {
        self.process = process;
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisRequest) -> Self {
        self.analysis = Some(analysis);
        self
    }
}

/// Returned by [`Orchestrator::submit`].
///
/// `events` is subscribed before the job starts, so it sees every event.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub experiment: ExperimentId,
    pub events: JobEvents,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Request cancellation. Same as [`Orchestrator::cancel`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Coordinates simulation jobs over an in-process engine and the external
/// simulator.
pub struct Orchestrator<E: SimulationEngine> {
    engine: Arc<E>,
    config: Arc<OrchestratorConfig>,
    jobs: Arc<JobTable>,
}

impl<E: SimulationEngine> Clone for Orchestrator<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
            jobs: Arc::clone(&self.jobs),
        }
    }
}

impl<E: SimulationEngine> Orchestrator<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, OrchestratorConfig::default())
    }

    pub fn with_config(engine: E, config: OrchestratorConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            jobs: Arc::new(JobTable::default()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a job and return without waiting for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> JobHandle {
        let id = JobId::new();
        let experiment = request.experiment;
        let record = JobRecord::new(experiment);
        let cancel = record.cancel.clone();
        let hub = Arc::clone(&record.events);
        self.jobs.insert(id, record);

        let events = hub.subscribe();
        self.jobs.with(id, |r| {
            r.status = JobStatus::Running;
            r.step = "started".to_string();
        });
        hub.emit(LifecycleEvent::Started);
        info!("job {} started (experiment {})", id, experiment);

        let job = JobContext {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
            reporter: JobReporter {
                id,
                table: Arc::clone(&self.jobs),
                events: Arc::clone(&hub),
            },
            cancel: cancel.clone(),
            request: Arc::new(request),
        };
        let table = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            // A panic inside the pipeline still ends the job.
            let outcome = match tokio::spawn(execute(job)).await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::from(e)),
            };
            finish(&table, &hub, id, outcome);
        });

        JobHandle {
            id,
            experiment,
            events,
            cancel,
        }
    }

    /// Cancel a job. Returns `true` if this call set the token.
    ///
    /// Cancelling twice, cancelling a finished job or an unknown id has no
    /// effect.
    pub fn cancel(&self, id: JobId) -> bool {
        self.jobs
            .with(id, |r| {
                if r.status.is_terminal() || r.cancel.is_cancelled() {
                    false
                } else {
                    r.cancel.cancel();
                    true
                }
            })
            .unwrap_or(false)
    }

    /// Subscribe to a job's events.
    ///
    /// A running job replays its history first; a finished job yields only
    /// its terminal event.
    pub fn subscribe(&self, id: JobId) -> Option<JobEvents> {
        let hub = self.jobs.with(id, |r| Arc::clone(&r.events))?;
        Some(hub.subscribe())
    }

    pub fn job(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.snapshot(id)
    }

    /// Ids of jobs that have not reached a terminal state.
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.jobs.active()
    }

    /// Drop finished jobs from the table. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        self.jobs.clear_finished()
    }
}

struct JobContext<E> {
    engine: Arc<E>,
    config: Arc<OrchestratorConfig>,
    reporter: JobReporter,
    cancel: CancellationToken,
    request: Arc<SubmitRequest>,
}

impl<E> JobContext<E> {
    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Record the outcome and emit the terminal event.
fn finish(table: &JobTable, hub: &EventHub, id: JobId, outcome: Result<CanonicalWaveform>) {
    let event = table
        .with(id, move |r| {
            if r.status.is_terminal() {
                return None;
            }
            let cancelled = r.cancel.is_cancelled() || matches!(outcome, Err(Error::Cancelled));
            let event = if cancelled {
                r.status = JobStatus::Cancelled;
                r.step = "cancelled".to_string();
                LifecycleEvent::Cancelled
            } else {
                match outcome {
                    Ok(waveform) => {
                        let waveform = Arc::new(waveform);
                        r.status = JobStatus::Completed;
                        r.progress = 1.0;
                        r.step = "completed".to_string();
                        r.result = Some(Arc::clone(&waveform));
                        LifecycleEvent::Completed(waveform)
                    }
                    Err(e) => {
                        let kind = e.kind();
                        let message = e.to_string();
                        r.status = JobStatus::Failed;
                        r.step = "failed".to_string();
                        r.error = Some((kind, message.clone()));
                        LifecycleEvent::Failed { kind, message }
                    }
                }
            };
            Some(event)
        })
        .flatten();

    if let Some(event) = event {
        match &event {
            LifecycleEvent::Failed { message, .. } => warn!("job {} failed: {}", id, message),
            LifecycleEvent::Cancelled => info!("job {} cancelled", id),
            _ => info!("job {} completed", id),
        }
        hub.emit(event);
    }
}

async fn execute<E: SimulationEngine>(job: JobContext<E>) -> Result<CanonicalWaveform> {
    if let Some(analysis) = &job.request.analysis {
        analysis.validate()?;
    }

    let route = choose_route(&job).await?;
    job.reporter.set_route(route.clone());
    job.check_cancelled()?;

    match route {
        Route::External(reason) => {
            info!("job {} routed to external simulator: {}", job.reporter.id, reason);
            run_external(&job).await
        }
        Route::InProcess => {
            debug!("job {} running in-process", job.reporter.id);
            run_in_process(&job).await
        }
    }
}

async fn choose_route<E>(job: &JobContext<E>) -> Result<Route> {
    if job.config.force_external {
        return Ok(Route::External("forced by configuration".to_string()));
    }

    job.reporter.progress(0.02, "checking model support");
    let request = Arc::clone(&job.request);
    let detector = job.config.detector.clone();
    let support = tokio::task::spawn_blocking(move || {
        detect_model_support(
            &request.netlist,
            request.source.as_deref(),
            &request.process,
            &detector,
        )
    })
    .await?;

    Ok(match support {
        ModelSupport::Native => Route::InProcess,
        ModelSupport::External(reason) => Route::External(reason.to_string()),
    })
}

async fn run_external<E>(job: &JobContext<E>) -> Result<CanonicalWaveform> {
    let request = &job.request;
    let external = ExternalJob::new(&request.netlist, &request.process)
        .with_source(request.source.as_deref())
        .with_request(request.analysis.as_ref())
        .with_poll_interval(job.config.subprocess_poll_interval);
    let reporter = job.reporter.clone();

    spicier_external::simulate(external, &job.cancel, |stage| {
        reporter.progress(stage.fraction(), stage.to_string());
    })
    .await
    .map_err(Error::from)
}

async fn run_in_process<E: SimulationEngine>(job: &JobContext<E>) -> Result<CanonicalWaveform> {
    let (system, unknowns) = {
        let engine = Arc::clone(&job.engine);
        let request = Arc::clone(&job.request);
        let reporter = job.reporter.clone();
        let cancel = job.cancel.clone();
        tokio::task::spawn_blocking(move || bind_system(&*engine, &request, &reporter, &cancel))
            .await??
    };

    let analysis = job
        .request
        .analysis
        .clone()
        .or_else(|| AnalysisRequest::first_in_netlist(&job.request.netlist))
        .unwrap_or(AnalysisRequest::OperatingPoint);
    analysis.validate()?;
    job.check_cancelled()?;
    debug!("job {}: {}", job.reporter.id, analysis.to_directive());

    match analysis {
        AnalysisRequest::Transient { stop_time, .. } => {
            run_transient(job, system, unknowns, analysis, stop_time).await
        }
        AnalysisRequest::DcSweep { .. } => {
            let engine = Arc::clone(&job.engine);
            let reporter = job.reporter.clone();
            let cancel = job.cancel.clone();
            tokio::task::spawn_blocking(move || {
                run_dc_sweep(&*engine, system, &unknowns, &analysis, &reporter, &cancel)
            })
            .await?
        }
        _ => {
            let engine = Arc::clone(&job.engine);
            let reporter = job.reporter.clone();
            let cancel = job.cancel.clone();
            tokio::task::spawn_blocking(move || {
                let mut system = system;
                reporter.progress(ANALYSIS_START, format!("running {}", analysis.kind()));
                let output = engine
                    .run_analysis(&mut system, &analysis, &mut RunContext::new(&cancel))
                    .map_err(|e| Error::from_stage(e, Error::Analysis))?;
                to_waveform(output, &unknowns)
            })
            .await?
        }
    }
}

/// Parse, lower, compile and bind, checking for cancellation between stages.
fn bind_system<E: SimulationEngine>(
    engine: &E,
    request: &SubmitRequest,
    reporter: &JobReporter,
    cancel: &CancellationToken,
) -> Result<(E::System, Vec<Unknown>)> {
    let check = || {
        if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    };

    reporter.progress(0.05, "parsing netlist");
    let parsed = engine
        .parse(&request.netlist, request.source.as_deref())
        .map_err(|e| Error::from_stage(e, Error::Parse))?;
    check()?;

    reporter.progress(0.1, "lowering circuit");
    let lowered = engine
        .lower(parsed, &request.process)
        .map_err(|e| Error::from_stage(e, Error::Lowering))?;
    check()?;

    reporter.progress(0.15, "compiling circuit");
    let compiled = engine
        .compile(lowered)
        .map_err(|e| Error::from_stage(e, Error::Compilation))?;
    check()?;

    reporter.progress(0.18, "binding devices");
    let system = engine
        .bind_devices(compiled)
        .map_err(|e| Error::from_stage(e, Error::DeviceBinding))?;
    check()?;

    let unknowns = engine.unknowns(&system);
    Ok((system, unknowns))
}

/// One operating point per swept value, rebinding the source each time.
fn run_dc_sweep<E: SimulationEngine>(
    engine: &E,
    mut system: E::System,
    unknowns: &[Unknown],
    analysis: &AnalysisRequest,
    reporter: &JobReporter,
    cancel: &CancellationToken,
) -> Result<CanonicalWaveform> {
    let AnalysisRequest::DcSweep { source, .. } = analysis else {
        return Err(Error::Internal(format!(
            "DC sweep runner given a {} request",
            analysis.kind()
        )));
    };
    let values = analysis.dc_sweep_values();
    let total = values.len().max(1) as f64;
    let op = AnalysisRequest::OperatingPoint;
    let mut collector = DcSweepCollector::new(source);

    for (i, value) in values.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        engine
            .set_source_value(&mut system, source, value)
            .map_err(|e| Error::from_stage(e, Error::Analysis))?;
        let output = engine
            .run_analysis(&mut system, &op, &mut RunContext::new(cancel))
            .map_err(|e| Error::from_stage(e, Error::Analysis))?;
        collector.push(value, output)?;
        reporter.progress(
            ANALYSIS_START + ANALYSIS_SPAN * (i + 1) as f64 / total,
            format!("{} = {}", source, format_engineering(value)),
        );
    }

    collector.finish(unknowns)
}

async fn run_transient<E: SimulationEngine>(
    job: &JobContext<E>,
    mut system: E::System,
    unknowns: Vec<Unknown>,
    analysis: AnalysisRequest,
    stop_time: f64,
) -> Result<CanonicalWaveform> {
    let channel = Arc::new(StreamingChannel::new());
    let done = CancellationToken::new();

    let poller = tokio::spawn(poll_stream(
        Arc::clone(&channel),
        unknowns.clone(),
        job.reporter.clone(),
        job.cancel.clone(),
        done.clone(),
        job.config.stream_poll_interval,
        stop_time,
    ));

    job.reporter.progress(ANALYSIS_START, "running transient");
    let engine = Arc::clone(&job.engine);
    let cancel = job.cancel.clone();
    let solved = tokio::task::spawn_blocking(move || {
        let mut on_step = |time: f64, solution: &[f64]| channel.append(time, solution);
        let mut ctx = RunContext::new(&cancel).with_step_callback(&mut on_step);
        engine.run_analysis(&mut system, &analysis, &mut ctx)
    })
    .await;

    // The solver is finished; the poller drains once more and exits.
    done.cancel();
    let builder = poller.await?;

    match solved? {
        Err(e) => Err(Error::from_stage(e, Error::Analysis)),
        Ok(EngineOutput::Transient { times, solutions })
            if builder.point_count() == 0 && !times.is_empty() =>
        {
            // The engine returned its steps without streaming them.
            to_waveform(EngineOutput::Transient { times, solutions }, &unknowns)
        }
        Ok(_) => Ok(builder.finish()),
    }
}

/// Drain the channel on every tick until `done`, then once more.
async fn poll_stream(
    channel: Arc<StreamingChannel>,
    unknowns: Vec<Unknown>,
    reporter: JobReporter,
    cancel: CancellationToken,
    done: CancellationToken,
    interval: Duration,
    stop_time: f64,
) -> IncrementalResultBuilder {
    let mut builder = IncrementalResultBuilder::new(unknowns);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = ticker.tick() => {
                // Interim updates stop once cancelled; the final drain below still runs.
                if !cancel.is_cancelled() {
                    flush(&channel, &mut builder, &reporter, stop_time);
                }
            }
        }
    }

    flush(&channel, &mut builder, &reporter, stop_time);
    builder
}

fn flush(
    channel: &StreamingChannel,
    builder: &mut IncrementalResultBuilder,
    reporter: &JobReporter,
    stop_time: f64,
) {
    let Some(batch) = channel.drain() else {
        return;
    };
    let added = builder.extend(batch);
    debug!(
        "job {}: drained {} steps ({} total)",
        reporter.id,
        added,
        builder.point_count()
    );

    if let Some(time) = builder.last_time() {
        let fraction = (time / stop_time).clamp(0.0, 1.0);
        reporter.progress(
            ANALYSIS_START + ANALYSIS_SPAN * fraction,
            format!("transient t = {}s", format_engineering(time)),
        );
    }
    reporter.waveform(Arc::new(builder.snapshot()));
}
