//! Authoring prefabs from live objects.

use std::collections::HashMap;
use std::sync::Arc;

use redlilium_core::Guid;
use serde_json::{Value, json};

use super::PrefabLibrary;
use crate::SceneError;
use crate::hierarchy;
use crate::object::{ObjectRef, PrefabLink};
use crate::save::SaveContext;
use crate::serialize::{ENGINE_BUILD, rewrite_ids};

/// Saves the subtree under `root` as a new prefab and links the subtree to
/// it. Objects that instance other prefabs become nested instances.
pub fn create_prefab(library: &Arc<PrefabLibrary>, root: &ObjectRef) -> Result<Guid, SceneError> {
    let prefab_id = Guid::new();
    let subtree = hierarchy::collect_subtree(root);
    let mut prefab_ids = HashMap::with_capacity(subtree.len());
    let mut links = Vec::with_capacity(subtree.len());
    for object in &subtree {
        let o = object.read();
        prefab_ids.insert(o.id(), Guid::new());
        let link = o.prefab_link();
        links.push(link.is_valid().then_some(link));
    }

    let document = build_document(library, prefab_id, root, &subtree, &links, &prefab_ids)?;
    library.save(prefab_id, &document)?;

    for object in &subtree {
        let mut o = object.write();
        if let Some(&prefab_object_id) = prefab_ids.get(&o.id()) {
            o.set_prefab_link(PrefabLink::new(prefab_id, prefab_object_id));
        }
    }
    log::info!(
        "Created prefab {prefab_id} from {} ({} objects)",
        root.read().id(),
        subtree.len()
    );
    Ok(prefab_id)
}

/// Writes the current state of the instance rooted at `instance_root` back
/// into its prefab.
///
/// Objects added to the instance get new prefab-object ids and are linked
/// to the prefab afterwards. Applying an unmodified instance rewrites the
/// prefab unchanged.
pub fn apply_prefab(library: &Arc<PrefabLibrary>, instance_root: &ObjectRef) -> Result<(), SceneError> {
    let link = instance_root.read().prefab_link();
    if !link.is_valid() {
        return Err(SceneError::InvalidArgument(
            "object is not a prefab instance".to_owned(),
        ));
    }
    let prefab = library.load(link.prefab_id)?;
    if link.prefab_object_id != prefab.root_id() {
        return Err(SceneError::InvalidArgument(format!(
            "object is not the root of its prefab {} instance",
            link.prefab_id
        )));
    }

    let subtree = hierarchy::collect_subtree(instance_root);
    let mut prefab_ids = HashMap::with_capacity(subtree.len());
    let mut links = Vec::with_capacity(subtree.len());
    let mut added = Vec::new();
    for object in &subtree {
        let o = object.read();
        let own = o.prefab_link();
        let (prefab_object_id, nested) = if own.prefab_id == link.prefab_id && own.is_valid() {
            (own.prefab_object_id, prefab.nested_link(own.prefab_object_id))
        } else {
            let new_id = Guid::new();
            added.push((Arc::clone(object), new_id));
            (new_id, own.is_valid().then_some(own))
        };
        prefab_ids.insert(o.id(), prefab_object_id);
        links.push(nested);
    }

    let document = build_document(library, link.prefab_id, instance_root, &subtree, &links, &prefab_ids)?;
    library.save(link.prefab_id, &document)?;

    for (object, prefab_object_id) in &added {
        object
            .write()
            .set_prefab_link(PrefabLink::new(link.prefab_id, *prefab_object_id));
    }
    log::info!(
        "Applied instance {} to prefab {} ({} new objects)",
        instance_root.read().id(),
        link.prefab_id,
        added.len()
    );
    Ok(())
}

/// Serializes `subtree` as a prefab document. `links[i]` is the nested
/// prefab link written for `subtree[i]`; live ids are then replaced with
/// prefab-object ids.
fn build_document(
    library: &Arc<PrefabLibrary>,
    prefab_id: Guid,
    root: &ObjectRef,
    subtree: &[ObjectRef],
    links: &[Option<PrefabLink>],
    prefab_ids: &HashMap<Guid, Guid>,
) -> Result<Value, SceneError> {
    let mut ctx = SaveContext::new(library);
    let mut data = Vec::with_capacity(subtree.len());
    for (object, link) in subtree.iter().zip(links) {
        let mut map = ctx.serialize_object_as(object, *link)?;
        if Arc::ptr_eq(object, root) {
            map.remove("ParentID");
        }
        data.push(Value::Object(map));
    }
    let mut document = json!({
        "ID": prefab_id.to_string(),
        "TypeName": root.read().type_name(),
        "EngineBuild": ENGINE_BUILD,
        "Data": data,
    });
    rewrite_ids(&mut document, prefab_ids);
    Ok(document)
}
