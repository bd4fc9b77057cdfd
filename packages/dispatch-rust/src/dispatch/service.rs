//! Tower adapters: expose a [`Dispatcher`] as a `tower::Service` per request type.
//!
//! Lets hosts stack tower middleware (rate limits, buffering, load shedding)
//! in front of dispatch. The services are always ready; backpressure belongs
//! to the layers around them.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use nexus_core::{Command, Outcome, Query};
use tokio_util::sync::CancellationToken;
use tower::Service;

use super::dispatcher::{Dispatcher, HandlerResolver};
use super::error::DispatchError;
use super::registry::HandlerRegistry;

type DispatchFuture<T> = Pin<Box<dyn Future<Output = Result<Outcome<T>, DispatchError>> + Send>>;

// ---------------------------------------------------------------------------
// CommandService
// ---------------------------------------------------------------------------

/// `tower::Service<C>` dispatching commands of type `C`.
///
/// Every call runs in its own scope under a child of the service's
/// cancellation token.
pub struct CommandService<C, S = HandlerRegistry> {
    dispatcher: Dispatcher<S>,
    cancel: CancellationToken,
    _request: PhantomData<fn(C)>,
}

impl<C, S> CommandService<C, S> {
    pub fn new(dispatcher: Dispatcher<S>, cancel: CancellationToken) -> Self {
        Self {
            dispatcher,
            cancel,
            _request: PhantomData,
        }
    }
}

impl<C, S> Clone for CommandService<C, S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            cancel: self.cancel.clone(),
            _request: PhantomData,
        }
    }
}

impl<C, S> Service<C> for CommandService<C, S>
where
    C: Command,
    S: HandlerResolver + 'static,
{
    type Response = Outcome<C::Response>;
    type Error = DispatchError;
    type Future = DispatchFuture<C::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: C) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.child_token();
        Box::pin(async move { dispatcher.dispatch_command(command, cancel).await })
    }
}

// ---------------------------------------------------------------------------
// QueryService
// ---------------------------------------------------------------------------

/// `tower::Service<Q>` dispatching queries of type `Q`, one scope per call.
pub struct QueryService<Q, S = HandlerRegistry> {
    dispatcher: Dispatcher<S>,
    cancel: CancellationToken,
    _request: PhantomData<fn(Q)>,
}

impl<Q, S> QueryService<Q, S> {
    pub fn new(dispatcher: Dispatcher<S>, cancel: CancellationToken) -> Self {
        Self {
            dispatcher,
            cancel,
            _request: PhantomData,
        }
    }
}

impl<Q, S> Clone for QueryService<Q, S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            cancel: self.cancel.clone(),
            _request: PhantomData,
        }
    }
}

impl<Q, S> Service<Q> for QueryService<Q, S>
where
    Q: Query,
    S: HandlerResolver + 'static,
{
    type Response = Outcome<Q::Response>;
    type Error = DispatchError;
    type Future = DispatchFuture<Q::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, query: Q) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.child_token();
        Box::pin(async move { dispatcher.dispatch_query(query, cancel).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
