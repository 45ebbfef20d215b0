//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spicier_external::DetectorConfig;

/// Default interval between transient stream drains.
pub const DEFAULT_STREAM_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default interval between subprocess supervisor polls.
pub const DEFAULT_SUBPROCESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How often the transient poller drains the streaming channel.
    pub stream_poll_interval: Duration,
    /// How often external tool supervisors check for exit and cancellation.
    pub subprocess_poll_interval: Duration,
    /// Model capability detection settings.
    pub detector: DetectorConfig,
    /// Route every job to the external simulator.
    pub force_external: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stream_poll_interval: DEFAULT_STREAM_POLL_INTERVAL,
            subprocess_poll_interval: DEFAULT_SUBPROCESS_POLL_INTERVAL,
            detector: DetectorConfig::default(),
            force_external: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_stream_poll_interval(mut self, interval: Duration) -> Self {
        self.stream_poll_interval = interval;
        self
    }

    pub fn with_subprocess_poll_interval(mut self, interval: Duration) -> Self {
        self.subprocess_poll_interval = interval;
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_force_external(mut self, force: bool) -> Self {
        self.force_external = force;
        self
    }
}
