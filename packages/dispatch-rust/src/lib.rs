//! Nexus dispatch: in-process command/query routing with pipeline behaviors
//! and an all-or-nothing unit of work.
//!
//! - [`dispatch`]: handler registry, scopes, the dispatcher and its tower adapters
//! - [`pipeline`]: behavior contracts and the reference behaviors
//! - [`unit_of_work`]: participants and the commit coordinator
//! - [`config`] / [`telemetry`]: configuration and `tracing` setup

pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod telemetry;
pub mod unit_of_work;

pub use config::DispatchConfig;
pub use dispatch::{
    CapabilityShape, CommandHandler, DispatchError, DispatchResult, Dispatcher, HandlerCandidate,
    HandlerRegistry, HandlerResolver, QueryHandler, Scope,
};
pub use nexus_core::{Command, Outcome, Query};
pub use pipeline::{
    register_standard_behaviors, Next, OpenBehavior, PipelineBehavior, RequestInfo,
};
pub use unit_of_work::{UnitOfWork, UnitOfWorkCoordinator, UnitOfWorkError, UnitOfWorkParticipant};
