//! Parent/child links, sibling order and tree-wide passes.

use std::sync::Arc;

use redlilium_core::Guid;
use redlilium_core::math::Transform;

use crate::SceneError;
use crate::object::ObjectRef;
use crate::registry::objects;

/// Attaches `child` under `parent` (appended last), or detaches it.
///
/// Fails on self-parenting, on a cycle, and when `parent` is a script.
pub fn set_parent(child: &ObjectRef, parent: Option<&ObjectRef>) -> Result<(), SceneError> {
    let (child_id, is_script, old_parent) = {
        let c = child.read();
        (c.id(), c.is_script(), c.parent())
    };

    if let Some(parent) = parent {
        if Arc::ptr_eq(parent, child) {
            return Err(invalid(child_id, "object cannot be its own parent"));
        }
        if !parent.read().is_actor() {
            return Err(invalid(child_id, "parent is not an actor"));
        }
        let mut cursor = parent.read().parent();
        while let Some(node) = cursor {
            if Arc::ptr_eq(&node, child) {
                return Err(invalid(child_id, "parent is a descendant of the object"));
            }
            cursor = node.read().parent();
        }
        if old_parent.as_ref().is_some_and(|old| Arc::ptr_eq(old, parent)) {
            return Ok(());
        }
    }

    if let Some(old) = &old_parent {
        remove_from_slot(old, child, is_script);
    }
    match parent {
        Some(parent) => {
            let parent_id = {
                let mut p = parent.write();
                if let Some(slot) = p.slot_mut(is_script) {
                    slot.push(Arc::clone(child));
                }
                p.id()
            };
            child.write().set_parent_link(Some(parent), parent_id);
        }
        None => child.write().set_parent_link(None, Guid::EMPTY),
    }
    Ok(())
}

fn invalid(object: Guid, reason: &str) -> SceneError {
    SceneError::InvalidHierarchy {
        object,
        reason: reason.to_owned(),
    }
}

fn remove_from_slot(parent: &ObjectRef, child: &ObjectRef, is_script: bool) -> Option<usize> {
    let mut p = parent.write();
    let slot = p.slot_mut(is_script)?;
    let index = slot.iter().position(|c| Arc::ptr_eq(c, child))?;
    slot.remove(index);
    Some(index)
}

/// Position of `object` among its parent's children (or scripts).
pub fn order_in_parent(object: &ObjectRef) -> Option<usize> {
    let (parent, is_script) = {
        let o = object.read();
        (o.parent()?, o.is_script())
    };
    let p = parent.read();
    let slot = if is_script { p.scripts() } else { p.children() };
    slot.iter().position(|c| Arc::ptr_eq(c, object))
}

/// Moves `object` to `index` among its siblings, clamped to the last slot.
///
/// Returns `false` when the object has no parent.
pub fn set_order_in_parent(object: &ObjectRef, index: usize) -> bool {
    let (parent, is_script) = {
        let o = object.read();
        match o.parent() {
            Some(parent) => (parent, o.is_script()),
            None => return false,
        }
    };
    let mut p = parent.write();
    let Some(slot) = p.slot_mut(is_script) else {
        return false;
    };
    let Some(current) = slot.iter().position(|c| Arc::ptr_eq(c, object)) else {
        return false;
    };
    let entry = slot.remove(current);
    let index = index.min(slot.len());
    slot.insert(index, entry);
    true
}

/// Depth-first listing: each actor, then its scripts, then its children.
pub fn collect_subtree(root: &ObjectRef) -> Vec<ObjectRef> {
    let mut out = Vec::new();
    push_subtree(root, &mut out);
    out
}

fn push_subtree(object: &ObjectRef, out: &mut Vec<ObjectRef>) {
    out.push(Arc::clone(object));
    let (scripts, children) = {
        let o = object.read();
        (o.scripts().to_vec(), o.children().to_vec())
    };
    for script in &scripts {
        out.push(Arc::clone(script));
    }
    for child in &children {
        push_subtree(child, out);
    }
}

/// Finds the first actor named `name` in the subtree.
pub fn find_by_name(root: &ObjectRef, name: &str) -> Option<ObjectRef> {
    collect_subtree(root)
        .into_iter()
        .find(|o| {
            let o = o.read();
            o.is_actor() && o.name() == name
        })
}

/// Topmost ancestor of `object` (itself when it has no parent).
pub fn root_of(object: &ObjectRef) -> ObjectRef {
    let mut current = Arc::clone(object);
    loop {
        let parent = current.read().parent();
        match parent {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}

/// Recomputes world transforms for `root` and everything below it.
pub fn update_world_transforms(root: &ObjectRef) {
    let parent_world = root
        .read()
        .parent()
        .and_then(|p| p.read().actor().map(|a| a.world_transform()))
        .unwrap_or(Transform::IDENTITY);
    update_world(root, &parent_world);
}

fn update_world(object: &ObjectRef, parent_world: &Transform) {
    let (world, children) = {
        let mut o = object.write();
        let Some(local) = o.actor().map(|a| a.transform) else {
            return;
        };
        let world = local.compose(parent_world);
        o.set_world_transform(world);
        (world, o.children().to_vec())
    };
    for child in &children {
        update_world(child, &world);
    }
}

/// Calls begin-play on every initialized object, parents first.
pub fn begin_play_tree(root: &ObjectRef) {
    for object in collect_subtree(root) {
        object.write().begin_play();
    }
}

/// Calls end-play in reverse depth-first order.
pub fn end_play_tree(root: &ObjectRef) {
    for object in collect_subtree(root).iter().rev() {
        object.write().end_play();
    }
}

/// Initializes every object of the subtree that is not yet initialized.
pub fn initialize_tree(root: &ObjectRef) {
    for object in collect_subtree(root) {
        object.write().initialize();
    }
}

/// Registers every object of the subtree.
pub fn register_tree(root: &ObjectRef) {
    for object in collect_subtree(root) {
        objects().register(&object);
    }
}

/// Ends play, detaches, unregisters and destroys `object` and its subtree.
pub fn delete_object(object: &ObjectRef) {
    let subtree = collect_subtree(object);
    for o in subtree.iter().rev() {
        o.write().end_play();
    }
    if let Err(err) = set_parent(object, None) {
        log::warn!("Failed to detach {:?}: {err}", object.read().id());
    }
    for o in subtree.iter().rev() {
        let mut guard = o.write();
        guard.take_children();
        guard.mark_destroyed();
        drop(guard);
        objects().unregister(o);
    }
    log::trace!("Deleted object {} ({} in subtree)", object.read().id(), subtree.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::{ACTOR_TYPE, SCRIPT_TYPE, types};

    fn actor() -> ObjectRef {
        types().construct(ACTOR_TYPE, Guid::new()).unwrap()
    }

    #[test]
    fn set_parent_appends_and_moves() {
        let a = actor();
        let b = actor();
        let c = actor();
        set_parent(&c, Some(&a)).unwrap();
        assert_eq!(a.read().children().len(), 1);
        assert_eq!(c.read().parent_id(), a.read().id());

        set_parent(&c, Some(&b)).unwrap();
        assert!(a.read().children().is_empty());
        assert_eq!(order_in_parent(&c), Some(0));

        set_parent(&c, None).unwrap();
        assert!(c.read().parent().is_none());
        assert_eq!(c.read().parent_id(), Guid::EMPTY);
    }

    #[test]
    fn cycles_and_self_parent_are_rejected() {
        let a = actor();
        let b = actor();
        set_parent(&b, Some(&a)).unwrap();
        assert!(matches!(
            set_parent(&a, Some(&a)),
            Err(SceneError::InvalidHierarchy { .. })
        ));
        assert!(matches!(
            set_parent(&a, Some(&b)),
            Err(SceneError::InvalidHierarchy { .. })
        ));
    }

    #[test]
    fn scripts_live_in_their_own_list() {
        let a = actor();
        let child = actor();
        let script = types().construct(SCRIPT_TYPE, Guid::new()).unwrap();
        set_parent(&child, Some(&a)).unwrap();
        set_parent(&script, Some(&a)).unwrap();
        assert_eq!(a.read().children().len(), 1);
        assert_eq!(a.read().scripts().len(), 1);
        assert!(set_parent(&child, Some(&script)).is_err());
    }

    #[test]
    fn order_is_clamped() {
        let parent = actor();
        let kids: Vec<_> = (0..3).map(|_| actor()).collect();
        for k in &kids {
            set_parent(k, Some(&parent)).unwrap();
        }
        assert!(set_order_in_parent(&kids[0], 10));
        assert_eq!(order_in_parent(&kids[0]), Some(2));
        assert!(set_order_in_parent(&kids[0], 0));
        assert_eq!(order_in_parent(&kids[0]), Some(0));
        assert!(!set_order_in_parent(&parent, 0));
    }

    #[test]
    fn subtree_order_is_actor_scripts_children() {
        let root = actor();
        let child = actor();
        let script = types().construct(SCRIPT_TYPE, Guid::new()).unwrap();
        set_parent(&child, Some(&root)).unwrap();
        set_parent(&script, Some(&root)).unwrap();
        let ids: Vec<Guid> = collect_subtree(&root).iter().map(|o| o.read().id()).collect();
        assert_eq!(
            ids,
            vec![root.read().id(), script.read().id(), child.read().id()]
        );
    }

    #[test]
    fn world_transforms_follow_parents() {
        let root = actor();
        let child = actor();
        root.write().actor_mut().unwrap().transform.translation = [1.0, 0.0, 0.0];
        child.write().actor_mut().unwrap().transform.translation = [0.0, 2.0, 0.0];
        set_parent(&child, Some(&root)).unwrap();
        update_world_transforms(&root);
        let world = child.read().actor().unwrap().world_transform();
        assert_eq!(world.translation, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn delete_unregisters_subtree() {
        let root = actor();
        let child = actor();
        set_parent(&child, Some(&root)).unwrap();
        register_tree(&root);
        let child_id = child.read().id();
        delete_object(&root);
        assert!(objects().find(child_id).is_none());
        assert!(child.read().is_destroyed());
        assert!(root.read().children().is_empty());
    }
}
