//! Process-wide lookup from object id to live object.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use redlilium_core::Guid;

use crate::object::{ObjectRef, WeakObjectRef};

/// Weak id index over every registered scene object.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<Guid, WeakObjectRef>>,
}

static OBJECTS: Lazy<ObjectRegistry> = Lazy::new(ObjectRegistry::default);

/// The process-wide object registry.
pub fn objects() -> &'static ObjectRegistry {
    &OBJECTS
}

impl ObjectRegistry {
    /// Registers `object` under its id, replacing any previous entry.
    pub fn register(&self, object: &ObjectRef) {
        let id = object.read().id();
        if !id.is_valid() {
            return;
        }
        self.objects.write().insert(id, Arc::downgrade(object));
    }

    /// Removes `object` if it is the one registered under its id.
    pub fn unregister(&self, object: &ObjectRef) {
        let id = object.read().id();
        let mut objects = self.objects.write();
        if objects
            .get(&id)
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), Arc::as_ptr(object)))
        {
            objects.remove(&id);
        }
    }

    pub fn find(&self, id: Guid) -> Option<ObjectRef> {
        self.objects.read().get(&id).and_then(|weak| weak.upgrade())
    }

    pub fn contains(&self, id: Guid) -> bool {
        self.find(id).is_some()
    }

    pub fn is_registered(&self, object: &ObjectRef) -> bool {
        let id = object.read().id();
        self.objects
            .read()
            .get(&id)
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), Arc::as_ptr(object)))
    }

    /// Drops entries whose objects no longer exist.
    pub fn prune(&self) -> usize {
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|_, weak| weak.strong_count() > 0);
        before - objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::{ACTOR_TYPE, types};

    #[test]
    fn register_find_unregister() {
        let registry = ObjectRegistry::default();
        let object = types().construct(ACTOR_TYPE, Guid::new()).unwrap();
        let id = object.read().id();
        registry.register(&object);
        assert!(registry.is_registered(&object));
        assert!(Arc::ptr_eq(&registry.find(id).unwrap(), &object));
        registry.unregister(&object);
        assert!(registry.find(id).is_none());
    }

    #[test]
    fn unregister_ignores_replaced_entries() {
        let registry = ObjectRegistry::default();
        let id = Guid::new();
        let first = types().construct(ACTOR_TYPE, id).unwrap();
        let second = types().construct(ACTOR_TYPE, id).unwrap();
        registry.register(&first);
        registry.register(&second);
        registry.unregister(&first);
        assert!(Arc::ptr_eq(&registry.find(id).unwrap(), &second));
    }

    #[test]
    fn dropped_objects_are_not_found() {
        let registry = ObjectRegistry::default();
        let id = Guid::new();
        registry.register(&types().construct(ACTOR_TYPE, id).unwrap());
        assert!(registry.find(id).is_none());
        assert_eq!(registry.prune(), 1);
    }
}
