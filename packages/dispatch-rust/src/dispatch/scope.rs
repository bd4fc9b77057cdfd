use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

use crate::unit_of_work::{UnitOfWork, UnitOfWorkCoordinator};

/// Services for one logical transaction.
///
/// A scope owns the ambient [`UnitOfWork`] and a typed service map. Handler and
/// behavior factories receive the scope of the dispatch they are resolved
/// for, so a handler enlisting into `scope.unit_of_work()` and the unit-of-work
/// behavior committing it see the same transaction. The dispatcher opens one
/// scope per request; do not share a scope between concurrent callers.
pub struct Scope {
    unit_of_work: Arc<dyn UnitOfWork>,
    services: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Scope {
    /// Scope with a fresh [`UnitOfWorkCoordinator`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_unit_of_work(Arc::new(UnitOfWorkCoordinator::new()))
    }

    #[must_use]
    pub fn with_unit_of_work(unit_of_work: Arc<dyn UnitOfWork>) -> Self {
        Self {
            unit_of_work,
            services: DashMap::new(),
        }
    }

    #[must_use]
    pub fn unit_of_work(&self) -> Arc<dyn UnitOfWork> {
        Arc::clone(&self.unit_of_work)
    }

    /// Make a service available to factories. Replaces any previous service of
    /// the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, service: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), service);
    }

    /// Retrieve a service by its concrete type.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct UserStore {
        table: &'static str,
    }

    #[test]
    fn insert_and_get_by_type() {
        let scope = Scope::new();
        scope.insert(Arc::new(UserStore { table: "users" }));

        let store = scope.get::<UserStore>();
        assert!(store.is_some());
        assert_eq!(store.unwrap().table, "users");
    }

    #[test]
    fn get_unregistered_returns_none() {
        let scope = Scope::new();
        assert!(scope.get::<UserStore>().is_none());
    }

    #[test]
    fn insert_replaces_previous_service() {
        let scope = Scope::new();
        scope.insert(Arc::new(UserStore { table: "old" }));
        scope.insert(Arc::new(UserStore { table: "new" }));
        assert_eq!(scope.get::<UserStore>().unwrap().table, "new");
    }

    #[test]
    fn unit_of_work_is_shared_within_scope() {
        let uow = Arc::new(UnitOfWorkCoordinator::new());
        let scope = Scope::with_unit_of_work(uow.clone());
        let a = scope.unit_of_work();
        let b = scope.unit_of_work();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
