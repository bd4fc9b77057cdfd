use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::FutureExt;
use nexus_core::{Command, HandlerShape, Outcome, Query, RequestKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::error::{DispatchError, DispatchResult};
use super::handler::{CommandHandler, QueryHandler};
use super::registry::{HandlerRegistry, ResolveError};
use super::scope::Scope;
use crate::pipeline::{compose, Next, PipelineBehavior};

/// Where a [`Dispatcher`] finds handlers and behaviors.
///
/// [`HandlerRegistry`] is the standard implementation; hosts with their own
/// container can implement this instead.
pub trait HandlerResolver: Send + Sync {
    /// The single handler for command `C`, built for `scope`.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NotFound`] when nothing is registered,
    /// [`ResolveError::Ambiguous`] when more than one implementation is.
    fn resolve_command_handler<C: Command>(
        &self,
        scope: &Scope,
    ) -> Result<Arc<dyn CommandHandler<C>>, ResolveError>;

    /// The single handler for query `Q`, built for `scope`.
    ///
    /// # Errors
    ///
    /// Same as [`HandlerResolver::resolve_command_handler`].
    fn resolve_query_handler<Q: Query>(
        &self,
        scope: &Scope,
    ) -> Result<Arc<dyn QueryHandler<Q>>, ResolveError>;

    /// Behaviors for `(R, T)`, in registration order. May be empty.
    fn resolve_behaviors<R, T>(
        &self,
        kind: RequestKind,
        scope: &Scope,
    ) -> Vec<Arc<dyn PipelineBehavior<R, T>>>
    where
        R: Send + Sync + 'static,
        T: Send + 'static;
}

/// The innermost pipeline step: the resolved handler.
#[async_trait]
trait Terminal<R, T>: Send + Sync {
    async fn call(&self, request: &R, cancel: CancellationToken) -> anyhow::Result<Outcome<T>>;
}

struct CommandTerminal<C: Command>(Arc<dyn CommandHandler<C>>);

#[async_trait]
impl<C: Command> Terminal<C, C::Response> for CommandTerminal<C> {
    async fn call(
        &self,
        request: &C,
        cancel: CancellationToken,
    ) -> anyhow::Result<Outcome<C::Response>> {
        self.0.handle(request, cancel).await
    }
}

struct QueryTerminal<Q: Query>(Arc<dyn QueryHandler<Q>>);

#[async_trait]
impl<Q: Query> Terminal<Q, Q::Response> for QueryTerminal<Q> {
    async fn call(
        &self,
        request: &Q,
        cancel: CancellationToken,
    ) -> anyhow::Result<Outcome<Q::Response>> {
        self.0.handle(request, cancel).await
    }
}

type ScopeFactory = Arc<dyn Fn() -> Scope + Send + Sync>;

/// Routes commands and queries to their handler through the behavior pipeline.
///
/// Each dispatch runs in its own [`Scope`], so every request gets a fresh
/// unit of work shared only by the handler and behaviors resolved for it.
/// [`Dispatcher::with_scopes`] seeds those scopes with host services;
/// [`Dispatcher::dispatch_command_in`] runs several requests in one scope the
/// caller owns.
pub struct Dispatcher<S = HandlerRegistry> {
    resolver: Arc<S>,
    scopes: ScopeFactory,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            scopes: Arc::clone(&self.scopes),
        }
    }
}

impl<S: HandlerResolver> Dispatcher<S> {
    /// A dispatcher that opens an empty [`Scope`] per request.
    pub fn new(resolver: Arc<S>) -> Self {
        Self::with_scopes(resolver, Scope::new)
    }

    /// A dispatcher that calls `scopes` once per request for its [`Scope`].
    pub fn with_scopes<F>(resolver: Arc<S>, scopes: F) -> Self
    where
        F: Fn() -> Scope + Send + Sync + 'static,
    {
        Self {
            resolver,
            scopes: Arc::new(scopes),
        }
    }

    /// Run `command` through its behaviors and handler in a fresh scope.
    ///
    /// # Errors
    ///
    /// [`DispatchError::HandlerNotRegistered`] or
    /// [`DispatchError::AmbiguousHandler`] when resolution fails, otherwise any
    /// fault raised by the handler or a behavior and not converted on the way out.
    pub async fn dispatch_command<C: Command>(
        &self,
        command: C,
        cancel: CancellationToken,
    ) -> DispatchResult<C::Response> {
        let scope = (self.scopes)();
        self.dispatch_command_in(&scope, command, cancel).await
    }

    /// Run `query` through its behaviors and handler in a fresh scope.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::dispatch_command`].
    pub async fn dispatch_query<Q: Query>(
        &self,
        query: Q,
        cancel: CancellationToken,
    ) -> DispatchResult<Q::Response> {
        let scope = (self.scopes)();
        self.dispatch_query_in(&scope, query, cancel).await
    }

    /// Run `command` with handler and behaviors built for `scope`.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::dispatch_command`].
    pub async fn dispatch_command_in<C: Command>(
        &self,
        scope: &Scope,
        command: C,
        cancel: CancellationToken,
    ) -> DispatchResult<C::Response> {
        self.dispatch(
            HandlerShape::command::<C>(),
            scope,
            command,
            |resolver, scope| resolver.resolve_command_handler::<C>(scope).map(CommandTerminal),
            cancel,
        )
        .await
    }

    /// Run `query` with handler and behaviors built for `scope`.
    ///
    /// # Errors
    ///
    /// Same as [`Dispatcher::dispatch_command`].
    pub async fn dispatch_query_in<Q: Query>(
        &self,
        scope: &Scope,
        query: Q,
        cancel: CancellationToken,
    ) -> DispatchResult<Q::Response> {
        self.dispatch(
            HandlerShape::query::<Q>(),
            scope,
            query,
            |resolver, scope| resolver.resolve_query_handler::<Q>(scope).map(QueryTerminal),
            cancel,
        )
        .await
    }

    async fn dispatch<R, T, H>(
        &self,
        shape: HandlerShape,
        scope: &Scope,
        request: R,
        resolve: impl FnOnce(&S, &Scope) -> Result<H, ResolveError> + Send,
        cancel: CancellationToken,
    ) -> DispatchResult<T>
    where
        R: Send + Sync + 'static,
        T: Send + 'static,
        H: Terminal<R, T>,
    {
        let span = info_span!(
            "dispatch",
            kind = %shape.kind,
            request = shape.request.short_name()
        );

        async move {
            let handler = resolve(self.resolver.as_ref(), scope).map_err(|err| {
                warn!(handler = %shape, error = %err, "handler resolution failed");
                resolution_fault(err, shape)
            })?;
            let behaviors = self.resolver.resolve_behaviors::<R, T>(shape.kind, scope);
            debug!(behaviors = behaviors.len(), "pipeline resolved");

            let request = &request;
            let handler = &handler;
            let terminal = Next::from_fn(move |cancel| {
                async move {
                    handler
                        .call(request, cancel)
                        .await
                        .map_err(DispatchError::Failed)
                }
                .boxed()
            });

            compose(request, &behaviors, terminal).run(cancel).await
        }
        .instrument(span)
        .await
    }
}

fn resolution_fault(err: ResolveError, shape: HandlerShape) -> DispatchError {
    match err {
        ResolveError::NotFound => DispatchError::HandlerNotRegistered {
            request_type: shape.request,
            handler_shape: shape,
        },
        ResolveError::Ambiguous { count } => DispatchError::AmbiguousHandler {
            handler_shape: shape,
            count,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
