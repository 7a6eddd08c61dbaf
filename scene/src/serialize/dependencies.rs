//! Scanning serialized data for embedded object references.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use redlilium_core::Guid;
use redlilium_core::guid::GUID_TEXT_LEN;

/// Collects every 32-hex id string found anywhere in `value`, keys included.
///
/// Used to discover which assets a document depends on. The result is
/// sorted and contains no empty ids.
pub fn collect_dependencies(value: &Value) -> Vec<Guid> {
    let mut found = BTreeSet::new();
    visit_strings(value, &mut |text| {
        if let Some(id) = parse_candidate(text) {
            found.insert(id);
        }
    });
    found.into_iter().collect()
}

/// Replaces every id string (value or key) found in `mapping`.
pub(crate) fn rewrite_ids(value: &mut Value, mapping: &HashMap<Guid, Guid>) {
    match value {
        Value::String(text) => {
            if let Some(new_id) = parse_candidate(text).and_then(|id| mapping.get(&id)) {
                *text = new_id.to_string();
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_ids(item, mapping);
            }
        }
        Value::Object(map) => {
            let renamed: Vec<(String, String)> = map
                .keys()
                .filter_map(|key| {
                    let id = parse_candidate(key)?;
                    mapping.get(&id).map(|new_id| (key.clone(), new_id.to_string()))
                })
                .collect();
            for (old_key, new_key) in renamed {
                if let Some(entry) = map.remove(&old_key) {
                    map.insert(new_key, entry);
                }
            }
            for entry in map.values_mut() {
                rewrite_ids(entry, mapping);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn parse_candidate(text: &str) -> Option<Guid> {
    if text.len() != GUID_TEXT_LEN {
        return None;
    }
    Guid::parse_hex(text).filter(Guid::is_valid)
}

fn visit_strings(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(text) => f(text),
        Value::Array(items) => {
            for item in items {
                visit_strings(item, f);
            }
        }
        Value::Object(map) => {
            for (key, entry) in map {
                f(key);
                visit_strings(entry, f);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn finds_ids_in_values_and_keys() {
        let a = Guid::new();
        let b = Guid::new();
        let c = Guid::new();
        let doc = json!({
            "ID": a.to_string(),
            "Data": [{ "Target": b.to_string(), "Name": "not an id" }],
            "Map": { c.to_string(): 1 },
            "Zero": Guid::EMPTY.to_string(),
        });
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(collect_dependencies(&doc), expected);
    }

    #[test]
    fn rewrite_replaces_only_mapped_ids() {
        let a = Guid::new();
        let b = Guid::new();
        let kept = Guid::new();
        let mapping: HashMap<Guid, Guid> = [(a, b)].into_iter().collect();
        let mut doc = json!({
            "ID": a.to_string(),
            "Other": kept.to_string(),
            "Keys": { a.to_string(): a.to_string() },
        });
        rewrite_ids(&mut doc, &mapping);
        assert_eq!(doc["ID"], json!(b.to_string()));
        assert_eq!(doc["Other"], json!(kept.to_string()));
        assert_eq!(doc["Keys"][b.to_string()], json!(b.to_string()));
    }
}
