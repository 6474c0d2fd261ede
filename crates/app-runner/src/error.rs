//! Error types for subsystems and the runner.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::runner::RunState;

/// Why an [`AppContext`](crate::AppContext) is done.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Error returned by a subsystem's `run` or `stop`.
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// The subsystem gave up because its context was done. `run` treats this
    /// as a clean stop.
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl SubsystemError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }
}

/// Errors produced while building or driving an [`AppRunner`](crate::AppRunner).
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("main app cannot be empty")]
    MissingMainApp,

    #[error("error registering prometheus collector: {0}")]
    CollectorRegistration(#[source] prometheus::Error),

    #[error("exit wait must be greater than zero, got {0:?}")]
    InvalidExitWait(Duration),

    #[error("app runner is not idle (state: {0:?})")]
    NotIdle(RunState),

    #[error("error starting app {app}: {source}")]
    AppStart {
        app: &'static str,
        #[source]
        source: SubsystemError,
    },

    #[error("app stop error {app}: {source}")]
    AppStop {
        app: &'static str,
        #[source]
        source: SubsystemError,
    },

    #[error("stopping apps exceeded exit wait duration ({pending} still stopping): {source}")]
    ExitWaitExceeded {
        pending: usize,
        #[source]
        source: ContextError,
    },

    #[error("failed to stop apps: {0}")]
    Shutdown(#[source] Box<RunnerError>),

    #[error(transparent)]
    Joined(ErrorList),
}

impl RunnerError {
    /// Combine errors into one value. `None` for an empty list, the error
    /// itself for a single one.
    pub fn join(mut errors: Vec<RunnerError>) -> Option<RunnerError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(RunnerError::Joined(ErrorList(errors))),
        }
    }

    pub(crate) fn pair(first: RunnerError, second: RunnerError) -> RunnerError {
        RunnerError::Joined(ErrorList(vec![first, second]))
    }

    /// Whether this error, or any error joined or wrapped inside it, is an
    /// exit-wait timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ExitWaitExceeded { .. } => true,
            Self::Shutdown(inner) => inner.is_timeout(),
            Self::Joined(list) => list.iter().any(RunnerError::is_timeout),
            _ => false,
        }
    }

    /// The flattened leaves of this error, unwrapping `Joined` and `Shutdown`.
    pub fn leaves(&self) -> Vec<&RunnerError> {
        match self {
            Self::Shutdown(inner) => inner.leaves(),
            Self::Joined(list) => list.iter().flat_map(RunnerError::leaves).collect(),
            other => vec![other],
        }
    }
}

/// Several independent errors reported as one, one message per line.
#[derive(Debug)]
pub struct ErrorList(Vec<RunnerError>);

impl ErrorList {
    pub fn iter(&self) -> impl Iterator<Item = &RunnerError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<RunnerError> {
        self.0
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}
