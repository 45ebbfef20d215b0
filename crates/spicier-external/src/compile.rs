//! Behavioral-model compilation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use spicier_core::ToolPaths;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::paths::MODEL_LIBRARY_EXTENSION;
use crate::runner::{DEFAULT_POLL_INTERVAL, supervise};

/// Compiles Verilog-A sources into OSDI model libraries.
#[derive(Debug, Clone)]
pub struct ModelCompiler {
    compiler: PathBuf,
    poll_interval: Duration,
}

impl ModelCompiler {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            compiler: tools.model_compiler.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Compile `source` inside `work_dir`.
    ///
    /// The source is copied into `work_dir` first and the compiler is run
    /// there with the bare file name, so its artifacts never land next to
    /// the caller's files. Returns the path of `<stem>.osdi`.
    pub async fn compile(
        &self,
        source: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| Error::PathResolution {
            directive: "model source".to_string(),
            path: source.display().to_string(),
            line: 0,
        })?;
        std::fs::create_dir_all(work_dir)?;
        let local = work_dir.join(file_name);
        std::fs::copy(source, &local)?;
        let expected = local.with_extension(MODEL_LIBRARY_EXTENSION);

        let mut command = Command::new(&self.compiler);
        command.arg(file_name).current_dir(work_dir);

        info!(
            "compiling {} with {}",
            source.display(),
            self.compiler.display()
        );
        let captured = supervise(command, &self.compiler, cancel, self.poll_interval).await?;

        if !captured.status.success() {
            return Err(Error::CompilerFailed {
                source_file: source.to_path_buf(),
                status: captured.status,
                output: captured.output,
            });
        }
        if !expected.is_file() {
            return Err(Error::CompilerMissingOutput {
                source_file: source.to_path_buf(),
                expected,
                output: captured.output,
            });
        }
        Ok(expected)
    }
}

/// Check whether the model compiler binary can be started.
pub fn is_model_compiler_available(tools: &ToolPaths) -> bool {
    std::process::Command::new(&tools.model_compiler)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
