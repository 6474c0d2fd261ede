//! # App Context
//!
//! Everything a subsystem call receives besides `&self`: a cancellation
//! token, an optional deadline, and request-scoped values carried as an
//! OpenTelemetry [`Context`](opentelemetry::Context).
//!
//! ```text
//! background() ──with_cancel()──→ run ctx ──without_cancel()──→ shutdown base
//!                                                  │
//!                                      with_timeout(exit_wait)
//!                                                  ↓
//!                                              stop ctx
//! ```
//!
//! Derived contexts share the parent's values. `with_cancel` and
//! `with_timeout` produce children that are done when the parent is done;
//! `without_cancel` deliberately cuts that link.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Cancellation, deadline and values handed to `Subsystem::run` / `stop`.
#[derive(Clone)]
pub struct AppContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: opentelemetry::Context,
}

impl AppContext {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// A context canceled through `token`.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            values: opentelemetry::Context::new(),
        }
    }

    /// Replace the carried values.
    pub fn with_values(mut self, values: opentelemetry::Context) -> Self {
        self.values = values;
        self
    }

    /// Child context plus the token that cancels it.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.token.child_token();
        let ctx = Self {
            token: token.clone(),
            deadline: self.deadline,
            values: self.values.clone(),
        };
        (ctx, token)
    }

    /// Child context that is also done once `timeout` has elapsed.
    ///
    /// The deadline never extends past the parent's own deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            values: self.values.clone(),
        }
    }

    /// Same values, but never canceled and without a deadline.
    pub fn without_cancel(&self) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            values: self.values.clone(),
        }
    }

    pub fn values(&self) -> &opentelemetry::Context {
        &self.values
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The token backing this context. Canceling it cancels this context and
    /// every context derived from it with `with_cancel` or `with_timeout`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the context is canceled or its deadline has passed.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(ContextError::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Some(ContextError::Canceled);
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("canceled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
