//! Timeout behavior.
//!
//! Fails requests whose remaining pipeline runs longer than the configured
//! duration with `DispatchError::Timeout`, and cancels the token the inner
//! steps were given.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{AnyResponse, Next, OpenBehavior, RequestInfo};
use crate::dispatch::{DispatchError, DispatchResult};

/// Bounds the duration of everything inside it. The standard pipeline places
/// it inside the unit of work, so the deadline never interrupts a commit.
#[derive(Debug, Clone)]
pub struct TimeoutBehavior {
    timeout: Duration,
}

impl TimeoutBehavior {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl OpenBehavior for TimeoutBehavior {
    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        next: Next<'_, AnyResponse>,
        cancel: CancellationToken,
    ) -> DispatchResult<AnyResponse> {
        let inner = cancel.child_token();
        match tokio::time::timeout(self.timeout, next.run(inner.clone())).await {
            Ok(result) => result,
            Err(_elapsed) => {
                inner.cancel();
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(request = request.name(), timeout_ms, "request timed out");
                Err(DispatchError::Timeout { timeout_ms })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::future::FutureExt;
    use nexus_core::{Outcome, RequestKind};
    use parking_lot::Mutex;

    use super::*;

    struct Ping;

    /// A pipeline tail that sleeps, then succeeds. Keeps the token it was given.
    fn slow_next(
        delay_ms: u64,
        seen: &Arc<Mutex<Option<CancellationToken>>>,
    ) -> Next<'static, AnyResponse> {
        let seen = Arc::clone(seen);
        Next::from_fn(move |cancel| {
            async move {
                *seen.lock() = Some(cancel);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(Outcome::success(AnyResponse::new(1u32)))
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn completes_within_timeout() {
        let behavior = TimeoutBehavior::new(Duration::from_millis(1000));
        let seen = Arc::new(Mutex::new(None));
        let info = RequestInfo::new(RequestKind::Command, &Ping);

        let outcome = behavior
            .handle(&info, slow_next(10, &seen), CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(!seen.lock().as_ref().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn exceeds_timeout_returns_error_and_cancels_inner_token() {
        let behavior = TimeoutBehavior::new(Duration::from_millis(50));
        let seen = Arc::new(Mutex::new(None));
        let info = RequestInfo::new(RequestKind::Query, &Ping);
        let caller = CancellationToken::new();

        let err = behavior
            .handle(&info, slow_next(200, &seen), caller.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Timeout { timeout_ms: 50 }));
        assert!(seen.lock().as_ref().unwrap().is_cancelled());
        // The caller's own token is left alone.
        assert!(!caller.is_cancelled());
    }
}
