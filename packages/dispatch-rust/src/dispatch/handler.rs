//! Handler contracts implemented by application code.

use async_trait::async_trait;
use nexus_core::{Command, Outcome, Query};
use tokio_util::sync::CancellationToken;

/// Handles one command type.
///
/// Expected failures are returned as `Outcome::Error`; an `Err` is an
/// unexpected fault and propagates out of the dispatcher unless a behavior
/// converts it.
#[async_trait]
pub trait CommandHandler<C: Command>: Send + Sync {
    async fn handle(
        &self,
        command: &C,
        cancel: CancellationToken,
    ) -> anyhow::Result<Outcome<C::Response>>;
}

/// Handles one query type. Same contract as [`CommandHandler`].
#[async_trait]
pub trait QueryHandler<Q: Query>: Send + Sync {
    async fn handle(
        &self,
        query: &Q,
        cancel: CancellationToken,
    ) -> anyhow::Result<Outcome<Q::Response>>;
}
