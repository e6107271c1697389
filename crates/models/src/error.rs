use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorShape {
    pub error_message: String,
}

/// Failure classes as seen by a caller of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad mounts, unknown runtime, unsupported debug combination. Never retried.
    Setup,
    /// The function process died or produced no framing envelope.
    ProcessCrash,
    /// The function reported an error through the normal protocol.
    Application,
    /// Exit pattern of an OOM or forced kill.
    SignalKilled,
}

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("invalid runtime name {runtime}")]
    InvalidRuntime { runtime: String },

    #[error("{reason}")]
    UnsupportedDebugConfiguration { reason: String },

    #[error("{reason}")]
    InvalidMount { reason: String },

    #[error("{reason}")]
    ContainerCreation { reason: String },

    #[error("Docker error: {message}")]
    DockerError { message: String },

    #[error("image {image} not found locally and pulling is disabled")]
    ImageNotFound { image: String },

    #[error("{entrypoint} exited with code {code}")]
    NonZeroExit { entrypoint: String, code: i64 },

    #[error("container was killed (exit code {code}, oom killed: {oom_killed})")]
    SignalKilled { code: i64, oom_killed: bool },

    #[error("process exited without producing a response: {reason}")]
    ProcessCrash { reason: String },

    #[error("{last_error}")]
    ServerNotReady { last_error: String },

    #[error("Signature doesn't match, request signature is {client}, but server signature is {server}")]
    SignatureMismatch { client: String, server: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("HTTP error: {reason}")]
    Http { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LocalError {
    pub fn to_error_shape(&self) -> ErrorShape {
        ErrorShape {
            error_message: self.to_string(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LocalError::InvalidRuntime { .. } => ErrorClass::Setup,
            LocalError::UnsupportedDebugConfiguration { .. } => ErrorClass::Setup,
            LocalError::InvalidMount { .. } => ErrorClass::Setup,
            LocalError::ContainerCreation { .. } => ErrorClass::Setup,
            LocalError::ImageNotFound { .. } => ErrorClass::Setup,
            LocalError::ConfigError { .. } => ErrorClass::Setup,
            LocalError::SignalKilled { .. } => ErrorClass::SignalKilled,
            LocalError::NonZeroExit { .. } => ErrorClass::ProcessCrash,
            LocalError::ProcessCrash { .. } => ErrorClass::ProcessCrash,
            LocalError::ServerNotReady { .. } => ErrorClass::ProcessCrash,
            LocalError::DockerError { .. } => ErrorClass::ProcessCrash,
            LocalError::Http { .. } => ErrorClass::ProcessCrash,
            LocalError::Io(_) => ErrorClass::ProcessCrash,
            LocalError::SignatureMismatch { .. } => ErrorClass::Application,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            LocalError::InvalidRuntime { .. } => 400,
            LocalError::UnsupportedDebugConfiguration { .. } => 400,
            _ => 500,
        }
    }

    /// True when the failure happened inside the function process rather than during setup.
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::ProcessCrash | ErrorClass::SignalKilled
        )
    }
}

/// Structured exit status of a container process or exec session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus {
    pub code: i64,
    pub oom_killed: bool,
}

/// SIGKILL as reported through a shell-style exit code (128 + 9).
pub const SIGKILL_EXIT_CODE: i64 = 137;

impl ExitStatus {
    pub fn success(&self) -> bool {
        self.code == 0 && !self.oom_killed
    }

    pub fn is_signal_killed(&self) -> bool {
        self.oom_killed || self.code == SIGKILL_EXIT_CODE
    }

    /// Converts a finished process into an error, keeping kills apart from plain failures.
    pub fn into_result(self, entrypoint: &str) -> Result<(), LocalError> {
        if self.success() {
            Ok(())
        } else if self.is_signal_killed() {
            Err(LocalError::SignalKilled {
                code: self.code,
                oom_killed: self.oom_killed,
            })
        } else {
            Err(LocalError::NonZeroExit {
                entrypoint: entrypoint.to_string(),
                code: self.code,
            })
        }
    }
}
