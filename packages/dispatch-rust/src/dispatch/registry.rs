//! Handler and behavior registrations.
//!
//! Handlers are keyed by their closed contract ([`HandlerShape`]). Each key
//! keeps every distinct implementation registered for it, so resolution can
//! tell "none" from "more than one". Behaviors are kept in a single list in
//! registration order; that order is the pipeline order.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use nexus_core::{Command, HandlerShape, Query, RequestKind, TypeKey};
use tracing::{debug, trace};

use super::handler::{CommandHandler, QueryHandler};
use super::scope::Scope;
use crate::pipeline::{OpenBehavior, OpenBehaviorAdapter, PipelineBehavior};

type CommandFactory<C> = Arc<dyn Fn(&Scope) -> Arc<dyn CommandHandler<C>> + Send + Sync>;
type QueryFactory<Q> = Arc<dyn Fn(&Scope) -> Arc<dyn QueryHandler<Q>> + Send + Sync>;
type BehaviorFactory<R, T> = Arc<dyn Fn(&Scope) -> Arc<dyn PipelineBehavior<R, T>> + Send + Sync>;
type OpenBehaviorFactory = Arc<dyn Fn(&Scope) -> Arc<dyn OpenBehavior> + Send + Sync>;

/// A typed factory behind `dyn Any`; downcast with the factory alias for its shape.
type ErasedFactory = Arc<dyn Any + Send + Sync>;

/// Why a handler lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no handler registered")]
    NotFound,
    #[error("{count} handlers registered")]
    Ambiguous { count: usize },
}

/// The handler contract a bulk registration scans candidates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityShape {
    CommandHandler,
    QueryHandler,
}

impl CapabilityShape {
    #[must_use]
    pub fn kind(self) -> RequestKind {
        match self {
            CapabilityShape::CommandHandler => RequestKind::Command,
            CapabilityShape::QueryHandler => RequestKind::Query,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

struct Binding {
    shape: HandlerShape,
    factory: ErasedFactory,
}

enum CandidateForm {
    Concrete {
        implementation: TypeKey,
        bindings: Vec<Binding>,
    },
    Abstract,
    GenericTemplate,
}

/// A type offered to [`HandlerRegistry::register`].
///
/// Only concrete candidates are registered. Abstract types and uninstantiated
/// generic templates are accepted and skipped, so a module can hand over
/// everything it declares without filtering first.
pub struct HandlerCandidate {
    name: &'static str,
    form: CandidateForm,
}

impl HandlerCandidate {
    /// A concrete handler type built by `factory`. Declare the contracts it
    /// fulfils with [`ConcreteCandidate::handles_command`] and
    /// [`ConcreteCandidate::handles_query`].
    pub fn concrete<H, F>(factory: F) -> ConcreteCandidate<H>
    where
        H: Send + Sync + 'static,
        F: Fn(&Scope) -> Arc<H> + Send + Sync + 'static,
    {
        ConcreteCandidate {
            factory: Arc::new(factory),
            bindings: Vec::new(),
        }
    }

    /// An abstract type such as `dyn Repository`. Never registered.
    #[must_use]
    pub fn abstract_type<T: ?Sized + 'static>() -> Self {
        Self {
            name: TypeKey::of::<T>().name(),
            form: CandidateForm::Abstract,
        }
    }

    /// A generic type with unbound parameters, e.g. `"Repository<T>"`. Never registered.
    #[must_use]
    pub fn generic_template(name: &'static str) -> Self {
        Self {
            name,
            form: CandidateForm::GenericTemplate,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The implementation type, for concrete candidates.
    #[must_use]
    pub fn implementation(&self) -> Option<TypeKey> {
        match &self.form {
            CandidateForm::Concrete { implementation, .. } => Some(*implementation),
            CandidateForm::Abstract | CandidateForm::GenericTemplate => None,
        }
    }
}

/// Builder for a concrete [`HandlerCandidate`].
pub struct ConcreteCandidate<H> {
    factory: Arc<dyn Fn(&Scope) -> Arc<H> + Send + Sync>,
    bindings: Vec<Binding>,
}

impl<H: Send + Sync + 'static> ConcreteCandidate<H> {
    #[must_use]
    pub fn handles_command<C: Command>(mut self) -> Self
    where
        H: CommandHandler<C>,
    {
        let factory = Arc::clone(&self.factory);
        let typed: CommandFactory<C> =
            Arc::new(move |scope: &Scope| -> Arc<dyn CommandHandler<C>> { factory(scope) });
        self.bindings.push(Binding {
            shape: HandlerShape::command::<C>(),
            factory: Arc::new(typed),
        });
        self
    }

    #[must_use]
    pub fn handles_query<Q: Query>(mut self) -> Self
    where
        H: QueryHandler<Q>,
    {
        let factory = Arc::clone(&self.factory);
        let typed: QueryFactory<Q> =
            Arc::new(move |scope: &Scope| -> Arc<dyn QueryHandler<Q>> { factory(scope) });
        self.bindings.push(Binding {
            shape: HandlerShape::query::<Q>(),
            factory: Arc::new(typed),
        });
        self
    }
}

impl<H: 'static> From<ConcreteCandidate<H>> for HandlerCandidate {
    fn from(candidate: ConcreteCandidate<H>) -> Self {
        let implementation = TypeKey::of::<H>();
        Self {
            name: implementation.name(),
            form: CandidateForm::Concrete {
                implementation,
                bindings: candidate.bindings,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

struct HandlerEntry {
    implementation: TypeKey,
    factory: ErasedFactory,
}

enum BehaviorEntry {
    Keyed {
        request: TypeId,
        response: TypeId,
        factory: ErasedFactory,
    },
    Open(OpenBehaviorFactory),
}

/// Registrations for one application: handlers by contract, behaviors in order.
///
/// Built once at startup, then shared read-only (typically behind an `Arc`)
/// by every [`Dispatcher`](super::Dispatcher).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerShape, Vec<HandlerEntry>>,
    registered: HashSet<(HandlerShape, TypeId)>,
    behaviors: Vec<BehaviorEntry>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every contract of `shape` that the candidates fulfil.
    ///
    /// Each `(contract, implementation)` pair is registered at most once no
    /// matter how often it is offered. Abstract and generic-template
    /// candidates are skipped.
    pub fn register<I>(&mut self, candidates: I, shape: CapabilityShape) -> &mut Self
    where
        I: IntoIterator<Item = HandlerCandidate>,
    {
        let kind = shape.kind();
        for candidate in candidates {
            let CandidateForm::Concrete {
                implementation,
                bindings,
            } = candidate.form
            else {
                trace!(candidate = candidate.name, "skipping non-concrete handler candidate");
                continue;
            };

            for binding in bindings.into_iter().filter(|b| b.shape.kind == kind) {
                if !self
                    .registered
                    .insert((binding.shape, implementation.id()))
                {
                    trace!(%implementation, shape = %binding.shape, "handler already registered");
                    continue;
                }
                debug!(%implementation, shape = %binding.shape, "registered handler");
                self.handlers
                    .entry(binding.shape)
                    .or_default()
                    .push(HandlerEntry {
                        implementation,
                        factory: binding.factory,
                    });
            }
        }
        self
    }

    /// Register `H` as the handler for command `C`.
    pub fn register_command_handler<C, H, F>(&mut self, factory: F) -> &mut Self
    where
        C: Command,
        H: CommandHandler<C> + 'static,
        F: Fn(&Scope) -> Arc<H> + Send + Sync + 'static,
    {
        let candidate = HandlerCandidate::concrete(factory).handles_command::<C>();
        self.register([HandlerCandidate::from(candidate)], CapabilityShape::CommandHandler)
    }

    /// Register `H` as the handler for query `Q`.
    pub fn register_query_handler<Q, H, F>(&mut self, factory: F) -> &mut Self
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
        F: Fn(&Scope) -> Arc<H> + Send + Sync + 'static,
    {
        let candidate = HandlerCandidate::concrete(factory).handles_query::<Q>();
        self.register([HandlerCandidate::from(candidate)], CapabilityShape::QueryHandler)
    }

    /// Append a behavior for requests of type `R` answering `T`.
    pub fn add_behavior<R, T, B, F>(&mut self, factory: F) -> &mut Self
    where
        R: Send + Sync + 'static,
        T: Send + 'static,
        B: PipelineBehavior<R, T> + 'static,
        F: Fn(&Scope) -> Arc<B> + Send + Sync + 'static,
    {
        let typed: BehaviorFactory<R, T> =
            Arc::new(move |scope: &Scope| -> Arc<dyn PipelineBehavior<R, T>> { factory(scope) });
        debug!(behavior = TypeKey::of::<B>().short_name(), "added behavior");
        self.behaviors.push(BehaviorEntry::Keyed {
            request: TypeId::of::<R>(),
            response: TypeId::of::<T>(),
            factory: Arc::new(typed),
        });
        self
    }

    /// Append a behavior for every request its [`OpenBehavior::applies_to`] accepts.
    pub fn add_open_behavior<B, F>(&mut self, factory: F) -> &mut Self
    where
        B: OpenBehavior + 'static,
        F: Fn(&Scope) -> Arc<B> + Send + Sync + 'static,
    {
        debug!(behavior = TypeKey::of::<B>().short_name(), "added open behavior");
        self.behaviors
            .push(BehaviorEntry::Open(Arc::new(move |scope: &Scope| -> Arc<dyn OpenBehavior> {
                factory(scope)
            })));
        self
    }

    /// Implementations registered under `shape`, in registration order.
    #[must_use]
    pub fn implementations(&self, shape: &HandlerShape) -> Vec<TypeKey> {
        self.handlers
            .get(shape)
            .map(|entries| entries.iter().map(|e| e.implementation).collect())
            .unwrap_or_default()
    }

    /// Total number of `(contract, implementation)` registrations.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn behavior_count(&self) -> usize {
        self.behaviors.len()
    }

    fn factory_for(&self, shape: &HandlerShape) -> Result<&ErasedFactory, ResolveError> {
        match self.handlers.get(shape).map(Vec::as_slice) {
            None | Some([]) => Err(ResolveError::NotFound),
            Some([entry]) => Ok(&entry.factory),
            Some(entries) => Err(ResolveError::Ambiguous {
                count: entries.len(),
            }),
        }
    }
}

impl super::HandlerResolver for HandlerRegistry {
    fn resolve_command_handler<C: Command>(
        &self,
        scope: &Scope,
    ) -> Result<Arc<dyn CommandHandler<C>>, ResolveError> {
        let factory = self
            .factory_for(&HandlerShape::command::<C>())?
            .downcast_ref::<CommandFactory<C>>()
            .ok_or(ResolveError::NotFound)?;
        Ok(factory(scope))
    }

    fn resolve_query_handler<Q: Query>(
        &self,
        scope: &Scope,
    ) -> Result<Arc<dyn QueryHandler<Q>>, ResolveError> {
        let factory = self
            .factory_for(&HandlerShape::query::<Q>())?
            .downcast_ref::<QueryFactory<Q>>()
            .ok_or(ResolveError::NotFound)?;
        Ok(factory(scope))
    }

    fn resolve_behaviors<R, T>(
        &self,
        kind: RequestKind,
        scope: &Scope,
    ) -> Vec<Arc<dyn PipelineBehavior<R, T>>>
    where
        R: Send + Sync + 'static,
        T: Send + 'static,
    {
        let mut resolved: Vec<Arc<dyn PipelineBehavior<R, T>>> = Vec::new();
        for entry in &self.behaviors {
            match entry {
                BehaviorEntry::Keyed {
                    request,
                    response,
                    factory,
                } => {
                    if *request != TypeId::of::<R>() || *response != TypeId::of::<T>() {
                        continue;
                    }
                    if let Some(factory) = factory.downcast_ref::<BehaviorFactory<R, T>>() {
                        resolved.push(factory(scope));
                    }
                }
                BehaviorEntry::Open(factory) => {
                    let behavior = factory(scope);
                    if behavior.applies_to(kind) {
                        resolved.push(Arc::new(OpenBehaviorAdapter::new(behavior, kind)));
                    }
                }
            }
        }
        resolved
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
