//! Pipeline behaviors: middleware wrapped around a handler call.
//!
//! Behaviors compose like onion layers. For behaviors `[B0, B1, ..., Bn-1]`
//! registered in that order and handler `H`, a dispatch runs
//! `B0-before, B1-before, ..., Bn-1-before, H, Bn-1-after, ..., B0-after`.
//! A behavior that returns without running [`Next`] short-circuits: later
//! behaviors and the handler never run, earlier behaviors still see the result.
//!
//! - [`PipelineBehavior`]: typed behavior for one request/response pair
//! - [`OpenBehavior`]: behavior applying to every request of a kind
//! - [`logging`], [`timeout`], [`unit_of_work`]: reference behaviors
//! - [`register_standard_behaviors`]: installs the reference behaviors in order

pub mod logging;
pub mod timeout;
pub mod unit_of_work;

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use nexus_core::{ClockSource, Outcome, RequestKind, SystemClock, TypeKey};
use tokio_util::sync::CancellationToken;

pub use logging::LoggingBehavior;
pub use timeout::TimeoutBehavior;
pub use unit_of_work::UnitOfWorkBehavior;

use crate::config::DispatchConfig;
use crate::dispatch::{DispatchError, DispatchResult, HandlerRegistry};

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

/// The rest of the pipeline, as seen from one behavior.
///
/// `run` consumes the value, so a behavior can continue the chain at most once.
/// Dropping it without running short-circuits the chain.
pub struct Next<'a, T> {
    step: Box<dyn FnOnce(CancellationToken) -> BoxFuture<'a, DispatchResult<T>> + Send + 'a>,
}

impl<'a, T: 'a> Next<'a, T> {
    /// Wrap a continuation. Useful for exercising a behavior in isolation.
    pub fn from_fn<F>(step: F) -> Self
    where
        F: FnOnce(CancellationToken) -> BoxFuture<'a, DispatchResult<T>> + Send + 'a,
    {
        Self {
            step: Box::new(step),
        }
    }

    /// Run the remaining behaviors and the handler.
    pub fn run(self, cancel: CancellationToken) -> BoxFuture<'a, DispatchResult<T>> {
        (self.step)(cancel)
    }
}

impl<T> fmt::Debug for Next<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Behavior contracts
// ---------------------------------------------------------------------------

/// Middleware for requests of type `R` answering `T`.
#[async_trait]
pub trait PipelineBehavior<R, T>: Send + Sync
where
    R: Send + Sync + 'static,
    T: Send + 'static,
{
    async fn handle(
        &self,
        request: &R,
        next: Next<'_, T>,
        cancel: CancellationToken,
    ) -> DispatchResult<T>;
}

/// Middleware applying to every request, independent of its concrete type.
///
/// The request is available through [`RequestInfo`] and the response is opaque
/// ([`AnyResponse`]): an open behavior can inspect success or failure, replace a
/// result with a failure, or pass it on, but cannot fabricate a success value.
#[async_trait]
pub trait OpenBehavior: Send + Sync {
    /// Whether the behavior joins pipelines of requests of `kind`.
    fn applies_to(&self, _kind: RequestKind) -> bool {
        true
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        next: Next<'_, AnyResponse>,
        cancel: CancellationToken,
    ) -> DispatchResult<AnyResponse>;
}

/// Type-erased view of the request an [`OpenBehavior`] is running for.
#[derive(Clone, Copy)]
pub struct RequestInfo<'a> {
    kind: RequestKind,
    request_type: TypeKey,
    payload: &'a (dyn Any + Send + Sync),
}

impl<'a> RequestInfo<'a> {
    pub fn new<R: Send + Sync + 'static>(kind: RequestKind, request: &'a R) -> Self {
        Self {
            kind,
            request_type: TypeKey::of::<R>(),
            payload: request,
        }
    }

    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    #[must_use]
    pub fn request_type(&self) -> TypeKey {
        self.request_type
    }

    /// Short request type name, e.g. `CreateUser`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.request_type.short_name()
    }

    #[must_use]
    pub fn downcast_ref<R: 'static>(&self) -> Option<&'a R> {
        self.payload.downcast_ref::<R>()
    }
}

impl fmt::Debug for RequestInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInfo")
            .field("kind", &self.kind)
            .field("request_type", &self.request_type)
            .finish_non_exhaustive()
    }
}

/// A response value whose type only the dispatcher knows.
pub struct AnyResponse(Box<dyn Any + Send>);

impl AnyResponse {
    fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    fn downcast<T: 'static>(self) -> Result<T, DispatchError> {
        self.0
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| DispatchError::ResponseMismatch {
                expected: type_name::<T>(),
            })
    }
}

impl fmt::Debug for AnyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AnyResponse(..)")
    }
}

/// Runs an [`OpenBehavior`] inside a typed pipeline.
pub(crate) struct OpenBehaviorAdapter {
    inner: Arc<dyn OpenBehavior>,
    kind: RequestKind,
}

impl OpenBehaviorAdapter {
    pub(crate) fn new(inner: Arc<dyn OpenBehavior>, kind: RequestKind) -> Self {
        Self { inner, kind }
    }
}

#[async_trait]
impl<R, T> PipelineBehavior<R, T> for OpenBehaviorAdapter
where
    R: Send + Sync + 'static,
    T: Send + 'static,
{
    async fn handle(
        &self,
        request: &R,
        next: Next<'_, T>,
        cancel: CancellationToken,
    ) -> DispatchResult<T> {
        let info = RequestInfo::new(self.kind, request);
        let erased = Next::from_fn(move |cancel| {
            async move {
                next.run(cancel)
                    .await
                    .map(|outcome| outcome.map(AnyResponse::new))
            }
            .boxed()
        });

        match self.inner.handle(&info, erased, cancel).await? {
            Outcome::Success(response) => response.downcast::<T>().map(Outcome::Success),
            Outcome::Error(message) => Ok(Outcome::Error(message)),
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Nest `behaviors` around `terminal`, first behavior outermost.
///
/// The chain is built from the last behavior to the first, so running the
/// returned [`Next`] enters `behaviors[0]` first.
pub fn compose<'a, R, T>(
    request: &'a R,
    behaviors: &'a [Arc<dyn PipelineBehavior<R, T>>],
    terminal: Next<'a, T>,
) -> Next<'a, T>
where
    R: Send + Sync + 'static,
    T: Send + 'static,
{
    behaviors.iter().rev().fold(terminal, |next, behavior| {
        Next::from_fn(move |cancel| behavior.handle(request, next, cancel))
    })
}

/// Install the reference behaviors, outermost to innermost:
/// 1. [`LoggingBehavior`]: logs every outcome and converts faults into failures
/// 2. [`UnitOfWorkBehavior`]: commits the scope's unit of work after a successful command
/// 3. [`TimeoutBehavior`]: bounds the handler by `config.request_timeout()`
///
/// The deadline sits inside the unit of work so it never interrupts a commit.
pub fn register_standard_behaviors(registry: &mut HandlerRegistry, config: &DispatchConfig) {
    let clock: Arc<dyn ClockSource> = Arc::new(SystemClock);
    let logging = Arc::new(LoggingBehavior::new(clock));
    let timeout = Arc::new(TimeoutBehavior::new(config.request_timeout()));

    registry
        .add_open_behavior(move |_| Arc::clone(&logging))
        .add_open_behavior(|scope| Arc::new(UnitOfWorkBehavior::new(scope.unit_of_work())))
        .add_open_behavior(move |_| Arc::clone(&timeout));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;

    type Trace = Arc<Mutex<Vec<String>>>;

    struct Ping;

    /// Records `label:before` / `label:after`; returns `stop` instead of
    /// continuing when `stop` is set.
    struct Step {
        label: String,
        stop: bool,
        trace: Trace,
    }

    #[async_trait]
    impl PipelineBehavior<Ping, u32> for Step {
        async fn handle(
            &self,
            _request: &Ping,
            next: Next<'_, u32>,
            cancel: CancellationToken,
        ) -> DispatchResult<u32> {
            self.trace.lock().push(format!("{}:before", self.label));
            let result = if self.stop {
                Ok(Outcome::error("stop"))
            } else {
                next.run(cancel).await
            };
            self.trace.lock().push(format!("{}:after", self.label));
            result
        }
    }

    fn terminal<'a>(trace: &Trace) -> Next<'a, u32> {
        let trace = Arc::clone(trace);
        Next::from_fn(move |_cancel| {
            async move {
                trace.lock().push("handler".to_string());
                Ok(Outcome::success(7))
            }
            .boxed()
        })
    }

    fn steps(
        count: usize,
        stop_at: Option<usize>,
        trace: &Trace,
    ) -> Vec<Arc<dyn PipelineBehavior<Ping, u32>>> {
        (0..count)
            .map(|i| {
                Arc::new(Step {
                    label: format!("b{i}"),
                    stop: stop_at == Some(i),
                    trace: Arc::clone(trace),
                }) as Arc<dyn PipelineBehavior<Ping, u32>>
            })
            .collect()
    }

    fn run_chain(count: usize, stop_at: Option<usize>) -> (DispatchResult<u32>, Vec<String>) {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let behaviors = steps(count, stop_at, &trace);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let result = runtime.block_on(async {
            compose(&Ping, &behaviors, terminal(&trace))
                .run(CancellationToken::new())
                .await
        });
        let entries = trace.lock().clone();
        (result, entries)
    }

    #[test]
    fn empty_chain_calls_handler_only() {
        let (result, trace) = run_chain(0, None);
        assert_eq!(result.unwrap(), Outcome::success(7));
        assert_eq!(trace, vec!["handler"]);
    }

    #[test]
    fn first_registered_behavior_is_outermost() {
        let (result, trace) = run_chain(2, None);
        assert_eq!(result.unwrap(), Outcome::success(7));
        assert_eq!(
            trace,
            vec!["b0:before", "b1:before", "handler", "b1:after", "b0:after"]
        );
    }

    #[test]
    fn short_circuit_skips_inner_steps_and_handler() {
        let (result, trace) = run_chain(3, Some(1));
        assert_eq!(result.unwrap(), Outcome::error("stop"));
        assert_eq!(
            trace,
            vec!["b0:before", "b1:before", "b1:after", "b0:after"]
        );
    }

    #[tokio::test]
    async fn open_behavior_sees_request_and_keeps_response_type() {
        struct Inspect(Mutex<Option<String>>);

        #[async_trait]
        impl OpenBehavior for Inspect {
            async fn handle(
                &self,
                request: &RequestInfo<'_>,
                next: Next<'_, AnyResponse>,
                cancel: CancellationToken,
            ) -> DispatchResult<AnyResponse> {
                assert!(request.downcast_ref::<Ping>().is_some());
                *self.0.lock() = Some(request.name().to_string());
                next.run(cancel).await
            }
        }

        let inspect = Arc::new(Inspect(Mutex::new(None)));
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let behaviors: Vec<Arc<dyn PipelineBehavior<Ping, u32>>> = vec![Arc::new(
            OpenBehaviorAdapter::new(inspect.clone(), RequestKind::Query),
        )];

        let result = compose(&Ping, &behaviors, terminal(&trace))
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, Outcome::success(7));
        assert_eq!(inspect.0.lock().as_deref(), Some("Ping"));
    }

    #[test]
    fn any_response_downcast_to_wrong_type_is_reported() {
        let err = AnyResponse::new(7u32).downcast::<String>().unwrap_err();
        assert!(matches!(err, DispatchError::ResponseMismatch { .. }));
    }

    proptest! {
        #[test]
        fn onion_order_holds_for_any_chain(count in 0usize..8) {
            let (result, trace) = run_chain(count, None);
            prop_assert_eq!(result.unwrap(), Outcome::success(7));

            let mut expected: Vec<String> = (0..count).map(|i| format!("b{i}:before")).collect();
            expected.push("handler".to_string());
            expected.extend((0..count).rev().map(|i| format!("b{i}:after")));
            prop_assert_eq!(trace, expected);
        }

        #[test]
        fn onion_order_holds_under_short_circuit(count in 1usize..8, stop in 0usize..8) {
            let stop = stop % count;
            let (result, trace) = run_chain(count, Some(stop));
            prop_assert_eq!(result.unwrap(), Outcome::error("stop"));

            let mut expected: Vec<String> = (0..=stop).map(|i| format!("b{i}:before")).collect();
            expected.extend((0..=stop).rev().map(|i| format!("b{i}:after")));
            prop_assert_eq!(trace, expected);
        }
    }
}
