use std::time::Duration;

use duet_core::ConfigError;

/// Failure talking to the simulation server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    /// Connection, timeout, or mid-stream I/O failure.
    #[error("{operation} network error: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },
    /// The response body did not have the expected shape.
    #[error("{operation} returned an unreadable body: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl TransportError {
    pub fn status(operation: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            operation,
            status,
            body: body.into(),
        }
    }

    pub fn network(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Network {
            operation,
            message: message.into(),
        }
    }

    pub fn decode(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            operation,
            message: message.into(),
        }
    }

    /// Name of the transport operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Status { operation, .. }
            | Self::Network { operation, .. }
            | Self::Decode { operation, .. } => operation,
        }
    }
}

/// Why a single run ended without completing its stream normally.
///
/// Contained to the run it belongs to; sibling runs never see it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server sent an `error` event.
    #[error("remote failure: {message}")]
    Remote { message: String },
    #[error("run cancelled")]
    Cancelled,
    #[error("run exceeded its {after:?} deadline")]
    TimedOut { after: Duration },
}

/// Errors returned by the public harness API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Invalid client or orchestrator configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The simulation payload was refused before any run started.
    #[error("invalid simulation config: {0}")]
    InvalidSimulation(#[from] ConfigError),
    #[error("run count must be between 1 and {max}, got {requested}")]
    RunCount { requested: usize, max: usize },
    /// A previous batch has not settled yet.
    #[error("a batch is already running")]
    BatchInProgress,
    #[error("no run at index {0}")]
    UnknownRun(usize),
    /// The run has not received its remote id yet.
    #[error("run {0} has not started")]
    RunNotStarted(usize),
    #[error("run {0} is still in progress")]
    RunInProgress(usize),
    #[error("run {index} has no turn {turn_number}")]
    UnknownTurn { index: usize, turn_number: u32 },
    #[error(transparent)]
    Transport(#[from] TransportError),
}
