//! Cancellable run context handed to [`Formatter::apply`](crate::Formatter::apply).
//!
//! A context combines a [`CancellationToken`] with an optional deadline. The
//! formatter never imposes its own timeout; whatever bound applies to a
//! subprocess comes from here.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The token was cancelled.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Cancelled => write!(f, "context cancelled"),
            Interrupt::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for Interrupt {}

/// Cancellation token plus optional deadline.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that is never done until [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token, e.g. one shared with a ctrl-c handler.
    pub fn from_token(cancel: CancellationToken) -> Self {
        RunContext {
            cancel,
            deadline: None,
        }
    }

    /// Bound the context to `timeout` from now.
    ///
    /// An earlier existing deadline is kept. A timeout too large to
    /// represent as an instant leaves the context unbounded.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Bound the context to `deadline`. An earlier existing deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// A child context: cancelled when this one is, but cancelling the child
    /// leaves the parent running.
    pub fn child(&self) -> Self {
        RunContext {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The interrupt that already applies, if any, without waiting.
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    ///
    /// Pending forever for a context with no deadline that is never cancelled.
    pub async fn done(&self) -> Interrupt {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Interrupt::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Interrupt::DeadlineExceeded,
                }
            }
            None => {
                self.cancel.cancelled().await;
                Interrupt::Cancelled
            }
        }
    }
}
