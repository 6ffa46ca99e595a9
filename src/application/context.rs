//! Per-call cancellation and deadlines.
//!
//! A [`CallContext`] travels with every store operation. Stages that may be
//! abandoned run through [`CallContext::run`], which resolves to
//! [`StoreError::Canceled`] as soon as the token fires or the deadline passes.

use crate::domain::error::StoreError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable handle that cancels every operation holding a copy of it.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self { state: Arc::new(state) }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// No cancellation, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Deadline measured from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails if the call has already been canceled or timed out.
    pub fn check(&self, stage: &str) -> Result<(), StoreError> {
        if self.is_cancelled() {
            return Err(StoreError::Canceled(stage.to_string()));
        }
        if self.is_expired() {
            return Err(StoreError::Canceled(format!("{stage} (deadline exceeded)")));
        }
        Ok(())
    }

    /// Drives `fut` unless the call is canceled or times out first.
    ///
    /// On cancellation `fut` is dropped before completing.
    pub async fn run<T, F>(&self, stage: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.check(stage)?;

        let cancelled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(StoreError::Canceled(stage.to_string())),
            _ = expired => Err(StoreError::Canceled(format!("{stage} (deadline exceeded)"))),
            result = fut => result,
        }
    }
}
