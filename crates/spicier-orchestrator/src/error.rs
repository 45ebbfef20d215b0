//! Error types for job orchestration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;

/// Result type for orchestration.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category shown to users, independent of which path failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Lowering,
    Compilation,
    DeviceBinding,
    Analysis,
    RequestValidation,
    PathResolution,
    ExternalCompiler,
    ExternalCompilerMissingOutput,
    ExternalProcess,
    ExternalProcessMissingOutput,
    ResultParse,
    Cancelled,
    Internal,
}

/// Errors that end a job.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse failed: {0}")]
    Parse(String),

    #[error("lowering failed: {0}")]
    Lowering(String),

    #[error("compilation failed: {0}")]
    Compilation(String),

    #[error("device binding failed: {0}")]
    DeviceBinding(String),

    /// The solver failed while running the analysis.
    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("invalid analysis request: {0}")]
    RequestValidation(String),

    /// The external simulator path failed.
    #[error(transparent)]
    External(spicier_external::Error),

    #[error("job cancelled")]
    Cancelled,

    /// A worker task died or returned inconsistent data.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use spicier_external::Error as Ext;

        match self {
            Error::Parse(_) => ErrorKind::Parse,
            Error::Lowering(_) => ErrorKind::Lowering,
            Error::Compilation(_) => ErrorKind::Compilation,
            Error::DeviceBinding(_) => ErrorKind::DeviceBinding,
            Error::Analysis(_) => ErrorKind::Analysis,
            Error::RequestValidation(_) => ErrorKind::RequestValidation,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Internal(_) => ErrorKind::Internal,
            Error::External(e) => match e {
                Ext::PathResolution { .. } => ErrorKind::PathResolution,
                Ext::CompilerFailed { .. } => ErrorKind::ExternalCompiler,
                Ext::CompilerMissingOutput { .. } => ErrorKind::ExternalCompilerMissingOutput,
                Ext::ProcessFailed { .. } | Ext::Spawn { .. } => ErrorKind::ExternalProcess,
                Ext::ProcessMissingOutput { .. } => ErrorKind::ExternalProcessMissingOutput,
                Ext::RawParse(_) => ErrorKind::ResultParse,
                Ext::Cancelled => ErrorKind::Cancelled,
                Ext::Io(_) => ErrorKind::Internal,
            },
        }
    }

    /// Map an engine failure at a given stage.
    pub(crate) fn from_stage(
        error: EngineError,
        stage: impl FnOnce(String) -> Error,
    ) -> Error {
        match error {
            EngineError::Cancelled => Error::Cancelled,
            EngineError::Failed(message) => stage(message),
        }
    }
}

impl From<spicier_external::Error> for Error {
    fn from(error: spicier_external::Error) -> Self {
        match error {
            spicier_external::Error::Cancelled => Error::Cancelled,
            other => Error::External(other),
        }
    }
}

impl From<spicier_core::Error> for Error {
    fn from(error: spicier_core::Error) -> Self {
        match error {
            spicier_core::Error::InvalidRequest(message) => Error::RequestValidation(message),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(error: tokio::task::JoinError) -> Self {
        Error::Internal(format!("worker task failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_errors_keep_their_kind() {
        let err = Error::from(spicier_external::Error::PathResolution {
            directive: ".include".to_string(),
            path: "x.lib".to_string(),
            line: 4,
        });
        assert_eq!(err.kind(), ErrorKind::PathResolution);
        assert!(err.to_string().contains("x.lib"));

        let err = Error::from(spicier_external::Error::RawParse(
            spicier_external::RawParseError::MissingData,
        ));
        assert_eq!(err.kind(), ErrorKind::ResultParse);
    }

    #[test]
    fn test_cancellation_is_never_external() {
        let err = Error::from(spicier_external::Error::Cancelled);
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = Error::from_stage(EngineError::Cancelled, Error::Parse);
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_request_validation_mapping() {
        let err = Error::from(spicier_core::Error::InvalidRequest("zero step".to_string()));
        assert_eq!(err.kind(), ErrorKind::RequestValidation);
        let err = Error::from_stage(EngineError::Failed("bad node".to_string()), Error::Lowering);
        assert_eq!(err.kind(), ErrorKind::Lowering);
        assert_eq!(err.to_string(), "lowering failed: bad node");
    }
}
