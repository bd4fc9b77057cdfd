//! Command and query dispatch.
//!
//! 1. **Registration** (`registry`): handlers keyed by contract, behaviors in order
//! 2. **Scope** (`scope`): per-transaction services and unit of work
//! 3. **Dispatch** (`dispatcher`): resolve the handler, wrap it in behaviors, run
//! 4. **Tower** (`service`): a dispatcher as a `tower::Service` per request type

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod registry;
pub mod scope;
pub mod service;

pub use dispatcher::{Dispatcher, HandlerResolver};
pub use error::{DispatchError, DispatchResult};
pub use handler::{CommandHandler, QueryHandler};
pub use registry::{
    CapabilityShape, ConcreteCandidate, HandlerCandidate, HandlerRegistry, ResolveError,
};
pub use scope::Scope;
pub use service::{CommandService, QueryService};
