//! Nexus core: the result model, request contracts and clock abstraction shared
//! by the dispatch engine and its hosts.

pub mod clock;
pub mod outcome;
pub mod request;

pub use clock::{ClockSource, SystemClock};
pub use outcome::{Outcome, OutcomeError, UNKNOWN_ERROR_MESSAGE};
pub use request::{Command, HandlerShape, Query, RequestKind, TypeKey};
