//! Ambient values that follow a producer across its suspension points.
//!
//! Every sequence owns an [`AmbientContext`]. The engine installs it on the resuming thread
//! for the duration of each resumption and restores whatever was installed before, so values
//! written by the producer are seen again after any suspension, even when the next
//! resumption happens on another thread.
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

thread_local! {
    /// The context installed on this thread. Outside of a resumption it is the thread's own.
    static CURRENT: RefCell<AmbientContext> = RefCell::new(AmbientContext::new());
}

/// A copy-on-write map from a value's type to the value.
#[derive(Clone, Default)]
pub struct AmbientContext {
    values: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl AmbientContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the context installed on the current thread.
    pub fn current() -> Self {
        CURRENT.try_with(|current| current.borrow().clone()).unwrap_or_default()
    }

    /// Returns the context with `value` added, replacing any value of the same type.
    pub fn with<V: Any + Send + Sync>(mut self, value: V) -> Self {
        self.insert(value);
        self
    }

    pub fn insert<V: Any + Send + Sync>(&mut self, value: V) {
        Arc::make_mut(&mut self.values).insert(TypeId::of::<V>(), Arc::new(value));
    }

    pub fn get<V: Any + Send + Sync>(&self) -> Option<&V> {
        self.values.get(&TypeId::of::<V>()).and_then(|value| value.downcast_ref::<V>())
    }

    /// Removes the value of type `V`. Returns whether it was present.
    pub fn remove<V: Any + Send + Sync>(&mut self) -> bool {
        if !self.values.contains_key(&TypeId::of::<V>()) {
            return false;
        }

        Arc::make_mut(&mut self.values).remove(&TypeId::of::<V>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Installs this context on the current thread until the returned scope is dropped.
    /// Changes made through [`set`] and [`remove`] are written back into `self`.
    pub(crate) fn enter(&mut self) -> Scope<'_> {
        swap_current(self);
        Scope { context: self }
    }
}

impl fmt::Debug for AmbientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientContext").field("len", &self.len()).finish()
    }
}

fn swap_current(context: &mut AmbientContext) {
    // The thread-local is gone only while the thread is exiting.
    let _ = CURRENT.try_with(|current| std::mem::swap(&mut *current.borrow_mut(), context));
}

pub(crate) struct Scope<'a> {
    context: &'a mut AmbientContext,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        swap_current(self.context);
    }
}

/// Sets an ambient value in the installed context.
pub fn set<V: Any + Send + Sync>(value: V) {
    let _ = CURRENT.try_with(|current| current.borrow_mut().insert(value));
}

/// Returns a copy of the ambient value of type `V`, if any.
pub fn get<V: Any + Send + Sync + Clone>() -> Option<V> {
    CURRENT
        .try_with(|current| current.borrow().get::<V>().cloned())
        .ok()
        .flatten()
}

/// Removes the ambient value of type `V`. Returns whether it was present.
pub fn remove<V: Any + Send + Sync>() -> bool {
    CURRENT
        .try_with(|current| current.borrow_mut().remove::<V>())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct RequestId(u64);

    #[test]
    fn test_insert_get_remove() {
        let mut context = AmbientContext::new();
        assert!(context.is_empty());

        context.insert(RequestId(7));
        assert_eq!(context.get::<RequestId>(), Some(&RequestId(7)));
        assert_eq!(context.len(), 1);

        assert!(context.remove::<RequestId>());
        assert!(!context.remove::<RequestId>());
        assert!(context.get::<RequestId>().is_none());
    }

    #[test]
    fn test_clones_are_copy_on_write() {
        let original = AmbientContext::new().with(RequestId(1));
        let mut copy = original.clone();
        copy.insert(RequestId(2));

        assert_eq!(original.get::<RequestId>(), Some(&RequestId(1)));
        assert_eq!(copy.get::<RequestId>(), Some(&RequestId(2)));
    }

    #[test]
    fn test_scope_installs_and_restores() {
        set(RequestId(100));
        let mut owned = AmbientContext::new().with(RequestId(1));

        {
            let _scope = owned.enter();
            assert_eq!(get::<RequestId>(), Some(RequestId(1)));
            set(RequestId(2));
        }

        assert_eq!(get::<RequestId>(), Some(RequestId(100)));
        assert_eq!(owned.get::<RequestId>(), Some(&RequestId(2)));
        assert!(remove::<RequestId>());
    }

    #[test]
    fn test_nested_scopes_unwind_in_order() {
        let mut outer = AmbientContext::new().with(RequestId(1));
        let mut inner = AmbientContext::new().with(RequestId(2));

        let outer_scope = outer.enter();
        {
            let _inner_scope = inner.enter();
            assert_eq!(get::<RequestId>(), Some(RequestId(2)));
        }
        assert_eq!(get::<RequestId>(), Some(RequestId(1)));
        drop(outer_scope);
        assert_eq!(get::<RequestId>(), None);
    }

    #[test]
    fn test_current_is_a_snapshot() {
        let mut owned = AmbientContext::new().with(RequestId(5));
        let _scope = owned.enter();
        let snapshot = AmbientContext::current();
        set(RequestId(6));
        assert_eq!(snapshot.get::<RequestId>(), Some(&RequestId(5)));
    }
}
