//! Request logging behavior.
//!
//! Logs the start of every request with the clock's timestamp, then one entry
//! for its result: success with elapsed time, a failed outcome with its
//! message, or a fault. Faults are converted into failed outcomes so callers
//! outside the pipeline only ever see `Outcome::Error` for them.

use std::sync::Arc;

use async_trait::async_trait;
use nexus_core::{ClockSource, Outcome};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{AnyResponse, Next, OpenBehavior, RequestInfo};
use crate::dispatch::DispatchResult;

pub struct LoggingBehavior {
    clock: Arc<dyn ClockSource>,
}

impl LoggingBehavior {
    pub fn new(clock: Arc<dyn ClockSource>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl OpenBehavior for LoggingBehavior {
    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        next: Next<'_, AnyResponse>,
        cancel: CancellationToken,
    ) -> DispatchResult<AnyResponse> {
        let name = request.name();
        let started_at = self.clock.now();
        info!(request = name, kind = %request.kind(), started_at, "request started");

        match next.run(cancel).await {
            Ok(outcome) => {
                let elapsed_ms = self.clock.now().saturating_sub(started_at);
                if outcome.is_success() {
                    info!(request = name, elapsed_ms, "request succeeded");
                } else {
                    warn!(
                        request = name,
                        elapsed_ms,
                        error = outcome.error_message(),
                        "request failed"
                    );
                }
                Ok(outcome)
            }
            Err(err) => {
                error!(request = name, error = %err, "request faulted");
                Ok(Outcome::error(format!(
                    "An unexpected error occurred in {name}: {err}"
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
