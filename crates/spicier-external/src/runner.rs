//! External process supervision.
//!
//! Tools run as `tokio` child processes. A supervisor loop polls the child
//! and the job's cancellation token at a fixed interval and kills the child
//! as soon as cancellation is observed.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use spicier_core::ToolPaths;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Interval between supervisor polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit status and captured stdout/stderr of a finished tool.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    /// Stdout followed by stderr, lossily decoded.
    pub output: String,
}

/// Spawn `command` and wait for it, killing it if `cancel` fires.
///
/// Cancellation wins over the exit status: once the token is set the
/// result is [`Error::Cancelled`] whatever the child did.
pub(crate) async fn supervise(
    mut command: Command,
    tool: &Path,
    cancel: &CancellationToken,
    poll_interval: Duration,
) -> Result<Captured> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        tool: tool.to_path_buf(),
        source,
    })?;
    let stdout = child.stdout.take().map(drain_pipe);
    let stderr = child.stderr.take().map(drain_pipe);

    let status = loop {
        if cancel.is_cancelled() {
            warn!("killing {} after cancellation", tool.display());
            if let Err(e) = child.kill().await {
                warn!("failed to kill {}: {}", tool.display(), e);
            }
            return Err(Error::Cancelled);
        }
        if let Some(status) = child.try_wait()? {
            break status;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(poll_interval) => {}
        }
    };

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut output = collect(stdout).await;
    let err = collect(stderr).await;
    if !err.is_empty() {
        if !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&err);
    }

    debug!("{} exited with {}", tool.display(), status);
    Ok(Captured { status, output })
}

fn drain_pipe<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    match handle {
        Some(handle) => String::from_utf8_lossy(&handle.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}

/// Runs the batch simulator on prepared netlists.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    simulator: PathBuf,
    poll_interval: Duration,
}

impl ProcessRunner {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            simulator: tools.simulator.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn simulator(&self) -> &Path {
        &self.simulator
    }

    /// Run `<simulator> -b <netlist>` in `working_dir`.
    ///
    /// Succeeds only when the simulator exits zero and `expected_output`
    /// exists afterwards.
    pub async fn run(
        &self,
        netlist_path: &Path,
        expected_output: &Path,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let mut command = Command::new(&self.simulator);
        command.arg("-b").arg(netlist_path).current_dir(working_dir);

        info!(
            "running {} -b {} (cwd {})",
            self.simulator.display(),
            netlist_path.display(),
            working_dir.display()
        );
        let captured = supervise(command, &self.simulator, cancel, self.poll_interval).await?;

        if !captured.status.success() {
            return Err(Error::ProcessFailed {
                status: captured.status,
                output: captured.output,
            });
        }
        if !expected_output.is_file() {
            return Err(Error::ProcessMissingOutput {
                expected: expected_output.to_path_buf(),
                output: captured.output,
            });
        }
        Ok(expected_output.to_path_buf())
    }
}

/// Check whether the simulator binary can be started.
pub fn is_simulator_available(tools: &ToolPaths) -> bool {
    std::process::Command::new(&tools.simulator)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// First line of the simulator's `--version` output.
pub fn simulator_version(tools: &ToolPaths) -> Result<String> {
    let output = std::process::Command::new(&tools.simulator)
        .arg("--version")
        .output()
        .map_err(|source| Error::Spawn {
            tool: tools.simulator.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(Error::ProcessFailed {
            status: output.status,
            output: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let version = String::from_utf8_lossy(&output.stdout);
    Ok(version
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown")
        .to_string())
}
