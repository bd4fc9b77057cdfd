use nexus_core::{HandlerShape, Outcome, TypeKey};

/// What a dispatch or a pipeline step produces: an [`Outcome`] for expected
/// results, a [`DispatchError`] for faults.
pub type DispatchResult<T> = Result<Outcome<T>, DispatchError>;

/// Faults raised while dispatching a request.
///
/// Business failures are never reported here; they are `Outcome::Error` values.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(
        "no handler is registered for request type `{request_type}`; \
         expected a registration for `{handler_shape}`"
    )]
    HandlerNotRegistered {
        request_type: TypeKey,
        handler_shape: HandlerShape,
    },
    #[error("{count} handlers are registered for `{handler_shape}`; exactly one is required")]
    AmbiguousHandler {
        handler_shape: HandlerShape,
        count: usize,
    },
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("pipeline produced a response that is not a `{expected}`")]
    ResponseMismatch { expected: &'static str },
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl DispatchError {
    /// Whether this is the missing-handler fault.
    #[must_use]
    pub fn is_handler_not_registered(&self) -> bool {
        matches!(self, DispatchError::HandlerNotRegistered { .. })
    }
}
