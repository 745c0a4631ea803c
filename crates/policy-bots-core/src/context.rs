//! Run-wide cancellation and deadline signal.
//!
//! A [`RunContext`] is threaded through every gateway call and every wait.
//! Clones share the same cancellation flag; [`RunContext::with_timeout`]
//! derives a context that additionally expires at a deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancels every [`RunContext`] derived from the pair it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Shared cancellation/deadline signal for one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    // Keeps the channel open for contexts that have no external handle.
    sender: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::with_cancel().0
    }

    /// A context plus the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let ctx = Self {
            sender: Arc::clone(&tx),
            rx,
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Derive a context that also expires after `timeout`. An earlier
    /// existing deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            sender: Arc::clone(&self.sender),
            rx: self.rx.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Some` once the context is cancelled or past its deadline.
    pub fn err(&self) -> Option<ContextError> {
        if *self.rx.borrow() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is done.
    pub async fn done(&self) -> ContextError {
        let mut rx = self.rx.clone();
        let cancelled = async move {
            loop {
                if *rx.borrow_and_update() {
                    return ContextError::Cancelled;
                }
                if rx.changed().await.is_err() {
                    // Sender gone: cancellation can no longer happen.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                err = cancelled => err,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => cancelled.await,
        }
    }

    /// Sleep for `duration` unless the context finishes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            err = self.done() => Err(err),
        }
    }

    /// Race `future` against the context.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            out = future => Ok(out),
            err = self.done() => Err(err),
        }
    }
}
