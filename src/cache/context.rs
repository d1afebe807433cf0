//! Cancellation and deadline carried through every cache call.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::error::{CacheError, CacheResult};

/// Execution context for a cache operation.
///
/// Cloning shares the cancellation token: cancelling any clone cancels all of
/// them. Use [`CacheContext::detached`] for work that must outlive the caller.
#[derive(Debug, Clone, Default)]
pub struct CacheContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().deadline_at(Instant::now() + timeout)
    }

    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Context for background work spawned on behalf of this one.
    ///
    /// Not linked to this context's cancellation and carries no deadline.
    pub fn detached(&self) -> Self {
        Self::new()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails fast if the context is already cancelled or past its deadline.
    pub fn check(&self) -> CacheResult<()> {
        if self.cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(CacheError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the context is cancelled, or the deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some(deadline) => {
                    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CacheError::Cancelled),
            _ = deadline => Err(CacheError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_passes_check() {
        let ctx = CacheContext::new();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancelled_context_fails_check() {
        let ctx = CacheContext::new();
        ctx.cancel();

        assert!(matches!(ctx.check(), Err(CacheError::Cancelled)));
    }

    #[test]
    fn test_expired_deadline_fails_check() {
        let ctx = CacheContext::new().deadline_at(Instant::now() - Duration::from_millis(1));

        assert!(matches!(ctx.check(), Err(CacheError::DeadlineExceeded)));
    }

    #[test]
    fn test_detached_ignores_parent_cancellation() {
        let parent = CacheContext::with_timeout(Duration::from_secs(60));
        let detached = parent.detached();

        parent.cancel();

        assert!(!detached.is_cancelled());
        assert!(detached.deadline().is_none());
    }

    #[tokio::test]
    async fn test_run_returns_future_result() {
        let ctx = CacheContext::new();
        let value = ctx.run(async { Ok(7) }).await.expect("run");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = CacheContext::with_timeout(Duration::from_millis(10));

        let result: CacheResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CacheError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let ctx = CacheContext::new();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let result: CacheResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CacheError::Cancelled)));
    }
}
