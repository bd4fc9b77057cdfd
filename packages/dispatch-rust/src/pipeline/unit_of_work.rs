//! Commits the scope's unit of work after a successful command.

use std::sync::Arc;

use async_trait::async_trait;
use nexus_core::{Outcome, RequestKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{AnyResponse, Next, OpenBehavior, RequestInfo};
use crate::dispatch::DispatchResult;
use crate::unit_of_work::UnitOfWork;

/// Runs the rest of the pipeline, then commits the unit of work if the
/// outcome is a success.
///
/// A failed outcome is returned untouched and nothing is committed. A failed
/// commit turns the success into a failure carrying the commit error's
/// message. Faults from inner steps propagate without a commit.
pub struct UnitOfWorkBehavior {
    unit_of_work: Arc<dyn UnitOfWork>,
}

impl UnitOfWorkBehavior {
    pub fn new(unit_of_work: Arc<dyn UnitOfWork>) -> Self {
        Self { unit_of_work }
    }
}

#[async_trait]
impl OpenBehavior for UnitOfWorkBehavior {
    fn applies_to(&self, kind: RequestKind) -> bool {
        kind == RequestKind::Command
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        next: Next<'_, AnyResponse>,
        cancel: CancellationToken,
    ) -> DispatchResult<AnyResponse> {
        let outcome = next.run(cancel.clone()).await?;
        if !outcome.is_success() {
            return Ok(outcome);
        }

        match self.unit_of_work.commit(cancel).await {
            Ok(()) => {
                debug!(request = request.name(), "unit of work committed");
                Ok(outcome)
            }
            Err(err) => {
                warn!(request = request.name(), error = %err, "unit of work commit failed");
                Ok(Outcome::error(err.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::FutureExt;

    use super::*;
    use crate::dispatch::DispatchError;
    use crate::unit_of_work::UnitOfWorkError;

    struct SaveUser;

    /// Counts commits; fails them with `message` when set.
    struct FakeUnitOfWork {
        commits: AtomicUsize,
        failure: Option<&'static str>,
    }

    impl FakeUnitOfWork {
        fn new(failure: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                commits: AtomicUsize::new(0),
                failure,
            })
        }
    }

    #[async_trait]
    impl UnitOfWork for FakeUnitOfWork {
        fn enlist(
            &self,
            _participant: Arc<dyn crate::unit_of_work::UnitOfWorkParticipant>,
        ) -> Result<(), UnitOfWorkError> {
            Ok(())
        }

        async fn commit(&self, _cancel: CancellationToken) -> Result<(), UnitOfWorkError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            match self.failure {
                Some(message) => Err(UnitOfWorkError::Commit(anyhow::anyhow!(message))),
                None => Ok(()),
            }
        }
    }

    fn answering(result: DispatchResult<AnyResponse>) -> Next<'static, AnyResponse> {
        Next::from_fn(move |_| async move { result }.boxed())
    }

    async fn run(
        uow: &Arc<FakeUnitOfWork>,
        result: DispatchResult<AnyResponse>,
    ) -> DispatchResult<AnyResponse> {
        let behavior = UnitOfWorkBehavior::new(uow.clone());
        let info = RequestInfo::new(RequestKind::Command, &SaveUser);
        behavior
            .handle(&info, answering(result), CancellationToken::new())
            .await
    }

    #[test]
    fn applies_to_commands_only() {
        let behavior = UnitOfWorkBehavior::new(FakeUnitOfWork::new(None));
        assert!(behavior.applies_to(RequestKind::Command));
        assert!(!behavior.applies_to(RequestKind::Query));
    }

    #[tokio::test]
    async fn success_commits_once_and_keeps_value() {
        let uow = FakeUnitOfWork::new(None);
        let outcome = run(&uow, Ok(Outcome::success(AnyResponse::new(5u64))))
            .await
            .unwrap();

        assert_eq!(uow.commits.load(Ordering::SeqCst), 1);
        let Outcome::Success(value) = outcome else {
            panic!("expected success");
        };
        assert_eq!(value.downcast::<u64>().unwrap(), 5);
    }

    #[tokio::test]
    async fn failed_outcome_is_returned_without_commit() {
        let uow = FakeUnitOfWork::new(None);
        let outcome = run(&uow, Ok(Outcome::error("name taken"))).await.unwrap();

        assert_eq!(uow.commits.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.error_message(), "name taken");
    }

    #[tokio::test]
    async fn commit_failure_becomes_failed_outcome() {
        let uow = FakeUnitOfWork::new(Some("db down"));
        let outcome = run(&uow, Ok(Outcome::success(AnyResponse::new(5u64))))
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.error_message(), "db down");
    }

    #[tokio::test]
    async fn inner_fault_propagates_without_commit() {
        let uow = FakeUnitOfWork::new(None);
        let err = run(&uow, Err(DispatchError::Failed(anyhow::anyhow!("boom"))))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(uow.commits.load(Ordering::SeqCst), 0);
    }
}
