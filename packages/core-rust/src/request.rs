//! Request contracts and the type identities used to key handlers.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A request expressing an intent to change state.
///
/// Each command type names exactly one response type; a handler for the pair
/// `(Self, Self::Response)` is registered under the command lookup table.
pub trait Command: Send + Sync + 'static {
    type Response: Send + 'static;
}

/// A read-only request. Looked up in the query table, otherwise identical to [`Command`].
pub trait Query: Send + Sync + 'static {
    type Response: Send + 'static;
}

/// Which lookup table a request is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Command,
    Query,
}

impl RequestKind {
    /// Name of the handler contract for this kind.
    #[must_use]
    pub fn handler_contract(self) -> &'static str {
        match self {
            RequestKind::Command => "CommandHandler",
            RequestKind::Query => "QueryHandler",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Command => f.write_str("command"),
            RequestKind::Query => f.write_str("query"),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeKey
// ---------------------------------------------------------------------------

/// Runtime identity of a Rust type, paired with its name for diagnostics.
///
/// Equality and hashing use the `TypeId` only.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name, e.g. `app::users::CreateUser`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module path or generic arguments, e.g. `CreateUser`.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// HandlerShape
// ---------------------------------------------------------------------------

/// A closed handler contract: kind, request type and response type.
///
/// This is the key handlers are registered and resolved under, and the
/// "expected handler" reported when resolution finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerShape {
    pub kind: RequestKind,
    pub request: TypeKey,
    pub response: TypeKey,
}

impl HandlerShape {
    #[must_use]
    pub fn command<C: Command>() -> Self {
        Self {
            kind: RequestKind::Command,
            request: TypeKey::of::<C>(),
            response: TypeKey::of::<C::Response>(),
        }
    }

    #[must_use]
    pub fn query<Q: Query>() -> Self {
        Self {
            kind: RequestKind::Query,
            request: TypeKey::of::<Q>(),
            response: TypeKey::of::<Q::Response>(),
        }
    }
}

impl fmt::Display for HandlerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}, {}>",
            self.kind.handler_contract(),
            self.request,
            self.response
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
