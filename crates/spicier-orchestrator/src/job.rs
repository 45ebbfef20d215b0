//! Job identities, status and the shared job table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use spicier_core::CanonicalWaveform;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::events::{EventHub, LifecycleEvent};

/// Identity of one simulation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of the experiment a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExperimentId(Uuid);

impl ExperimentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        })
    }
}

/// Execution path chosen for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    InProcess,
    /// External simulator, with the reason it was chosen.
    External(String),
}

/// Point-in-time copy of a job record.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub experiment: ExperimentId,
    pub status: JobStatus,
    pub progress: f64,
    /// Human-readable label of the current step.
    pub step: String,
    pub route: Option<Route>,
    pub error: Option<(ErrorKind, String)>,
    pub result: Option<Arc<CanonicalWaveform>>,
}

#[derive(Debug)]
pub(crate) struct JobRecord {
    pub(crate) experiment: ExperimentId,
    pub(crate) status: JobStatus,
    pub(crate) progress: f64,
    pub(crate) step: String,
    pub(crate) route: Option<Route>,
    pub(crate) error: Option<(ErrorKind, String)>,
    pub(crate) result: Option<Arc<CanonicalWaveform>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) events: Arc<EventHub>,
}

impl JobRecord {
    pub(crate) fn new(experiment: ExperimentId) -> Self {
        Self {
            experiment,
            status: JobStatus::Pending,
            progress: 0.0,
            step: String::new(),
            route: None,
            error: None,
            result: None,
            cancel: CancellationToken::new(),
            events: Arc::new(EventHub::new()),
        }
    }

    fn snapshot(&self, id: JobId) -> JobSnapshot {
        JobSnapshot {
            id,
            experiment: self.experiment,
            status: self.status,
            progress: self.progress,
            step: self.step.clone(),
            route: self.route.clone(),
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Job records keyed by id. The lock is held only for map access.
#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: Mutex<HashMap<JobId, JobRecord>>,
}

impl JobTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, id: JobId, record: JobRecord) {
        self.lock().insert(id, record);
    }

    /// Apply `f` to a record and return its result.
    pub(crate) fn with<R>(&self, id: JobId, f: impl FnOnce(&mut JobRecord) -> R) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }

    pub(crate) fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.lock().get(&id).map(|r| r.snapshot(id))
    }

    pub(crate) fn active(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .lock()
            .iter()
            .filter(|(_, r)| !r.status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn clear_finished(&self) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, r| !r.status.is_terminal());
        before - jobs.len()
    }
}

/// Handle used by a running job to report progress.
#[derive(Debug, Clone)]
pub(crate) struct JobReporter {
    pub(crate) id: JobId,
    pub(crate) table: Arc<JobTable>,
    pub(crate) events: Arc<EventHub>,
}

impl JobReporter {
    /// Update the record's progress and emit a progress event.
    pub(crate) fn progress(&self, fraction: f64, label: impl Into<String>) {
        let label = label.into();
        let fraction = fraction.clamp(0.0, 1.0);
        self.table.with(self.id, |r| {
            r.progress = fraction;
            r.step = label.clone();
        });
        self.events.emit(LifecycleEvent::Progress { fraction, label });
    }

    pub(crate) fn waveform(&self, waveform: Arc<CanonicalWaveform>) {
        self.events.emit(LifecycleEvent::WaveformUpdate(waveform));
    }

    pub(crate) fn set_route(&self, route: Route) {
        self.table.with(self.id, |r| r.route = Some(route));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_table_clear_finished() {
        let table = JobTable::default();
        let running = JobId::new();
        let done = JobId::new();
        table.insert(running, JobRecord::new(ExperimentId::new()));
        table.insert(done, JobRecord::new(ExperimentId::new()));
        table.with(running, |r| r.status = JobStatus::Running);
        table.with(done, |r| r.status = JobStatus::Completed);

        assert_eq!(table.active(), vec![running]);
        assert_eq!(table.clear_finished(), 1);
        assert!(table.snapshot(done).is_none());
        assert_eq!(table.snapshot(running).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
        let id = JobId::new();
        assert_eq!(id.to_string().len(), 36);
    }
}
