//! All-or-nothing commit across independently enlisted participants.
//!
//! Handlers enlist the participants they touched; the unit-of-work pipeline
//! behavior commits them once the handler has succeeded. Commit runs in two
//! passes over the participants in enlistment order: every `prepare`, then
//! every `commit`. A failed `commit` rolls back every participant.
//!
//! Known limitations:
//! - a failed `prepare` propagates without rolling anything back;
//! - a failed `rollback` aborts the rollback pass and replaces the commit error
//!   as the primary error (the commit error is still attached).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// A resource taking part in a unit of work (a repository, an outbox, a file).
#[async_trait]
pub trait UnitOfWorkParticipant: Send + Sync {
    /// Validate and stage pending changes. Nothing is made durable yet.
    async fn prepare(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Make staged changes durable.
    async fn commit(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Discard staged changes. Called on every participant when any commit fails.
    async fn rollback(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// The ambient transaction a scope exposes to handlers and behaviors.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Add a participant to the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`UnitOfWorkError::AlreadyEnlisted`] if the same instance is
    /// already part of the transaction.
    fn enlist(&self, participant: Arc<dyn UnitOfWorkParticipant>) -> Result<(), UnitOfWorkError>;

    /// Prepare and commit every enlisted participant.
    ///
    /// # Errors
    ///
    /// Returns the first prepare or commit failure, or the rollback failure
    /// that interrupted recovery from a commit failure.
    async fn commit(&self, cancel: CancellationToken) -> Result<(), UnitOfWorkError>;
}

/// Errors raised by a unit of work.
///
/// `Prepare` and `Commit` display the participant's own message, so callers
/// that surface them as business failures show what actually went wrong.
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("participant is already enlisted")]
    AlreadyEnlisted,
    #[error(transparent)]
    Prepare(anyhow::Error),
    #[error(transparent)]
    Commit(anyhow::Error),
    #[error("rollback failed: {source}")]
    Rollback {
        source: anyhow::Error,
        /// The commit failure that triggered the rollback.
        commit_error: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// UnitOfWorkCoordinator
// ---------------------------------------------------------------------------

/// Standard [`UnitOfWork`]: an ordered, deduplicated list of participants.
///
/// One coordinator belongs to one logical transaction and one caller.
/// It is cleared after a fully successful commit and can then be reused.
#[derive(Default)]
pub struct UnitOfWorkCoordinator {
    participants: Mutex<Vec<Arc<dyn UnitOfWorkParticipant>>>,
}

impl UnitOfWorkCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently enlisted participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.lock().is_empty()
    }
}

#[async_trait]
impl UnitOfWork for UnitOfWorkCoordinator {
    fn enlist(&self, participant: Arc<dyn UnitOfWorkParticipant>) -> Result<(), UnitOfWorkError> {
        let mut participants = self.participants.lock();
        if participants.iter().any(|p| Arc::ptr_eq(p, &participant)) {
            return Err(UnitOfWorkError::AlreadyEnlisted);
        }
        participants.push(participant);
        Ok(())
    }

    async fn commit(&self, cancel: CancellationToken) -> Result<(), UnitOfWorkError> {
        // Snapshot so no lock is held across participant calls.
        let participants = self.participants.lock().clone();
        debug!(participants = participants.len(), "committing unit of work");

        for participant in &participants {
            participant
                .prepare(cancel.clone())
                .await
                .map_err(UnitOfWorkError::Prepare)?;
        }

        let mut commit_error = None;
        for participant in &participants {
            if let Err(err) = participant.commit(cancel.clone()).await {
                commit_error = Some(err);
                break;
            }
        }

        if let Some(commit_error) = commit_error {
            warn!(error = %commit_error, "commit failed, rolling back all participants");
            for participant in &participants {
                if let Err(source) = participant.rollback(cancel.clone()).await {
                    return Err(UnitOfWorkError::Rollback {
                        source,
                        commit_error,
                    });
                }
            }
            return Err(UnitOfWorkError::Commit(commit_error));
        }

        self.participants.lock().clear();
        debug!("unit of work committed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
