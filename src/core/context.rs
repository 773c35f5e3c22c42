//! Per-request cancellation and deadline propagation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::SummaryError;

/// Carries the caller's cancellation signal, an optional deadline, and a
/// correlation id for logs through every suspension point of a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    correlation_id: String,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Wraps an existing token, so a caller can cancel from the outside.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Returns a child context whose deadline is the earlier of the current
    /// one and `now + timeout`. Cancelling the parent cancels the child.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
            correlation_id: self.correlation_id.clone(),
        }
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drives `fut` to completion unless the context ends first.
    ///
    /// The wrapped future is polled first, so a more specific error it
    /// produces on cancellation wins over the generic one.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Cancelled`] if the context ends before `fut`
    /// completes, otherwise whatever `fut` returns.
    pub async fn run<F, T>(&self, what: &str, fut: F) -> Result<T, SummaryError>
    where
        F: Future<Output = Result<T, SummaryError>>,
    {
        tokio::select! {
            biased;
            result = fut => result,
            () = self.cancelled() => Err(SummaryError::Cancelled(format!(
                "{what} interrupted by cancellation or deadline"
            ))),
        }
    }
}
