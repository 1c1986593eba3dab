//! Label removal inside stored documents.
//!
//! A label is an object carrying its own `_id`. A field holds either a single
//! label, a list of labels, or a container object whose list members are
//! labels (e.g. `{"_cls": "Detections", "detections": [...]}`).

use std::collections::HashSet;

use serde_json::Value;

use vframe_models::Document;

fn is_selected(value: &Value, ids: &HashSet<&str>) -> bool {
    value
        .get("_id")
        .and_then(Value::as_str)
        .is_some_and(|id| ids.contains(id))
}

/// Remove labels with the given ids from a field value. Returns true if the
/// value changed. A single selected label becomes `null`.
pub fn remove_labels(value: &mut Value, ids: &HashSet<&str>) -> bool {
    if is_selected(value, ids) {
        *value = Value::Null;
        return true;
    }

    let mut changed = false;
    match value {
        Value::Array(items) => {
            let before = items.len();
            items.retain(|item| !is_selected(item, ids));
            changed = items.len() != before;
        }
        Value::Object(map) => {
            for member in map.values_mut() {
                if let Value::Array(items) = member {
                    let before = items.len();
                    items.retain(|item| !is_selected(item, ids));
                    changed |= items.len() != before;
                }
            }
        }
        _ => {}
    }
    changed
}

/// Delete labels from the given fields of one document.
///
/// If the document's own `_id` is selected the fields are removed outright;
/// otherwise only selected labels inside the fields are removed. Returns true
/// if the document changed.
pub fn delete_in_document(doc: &mut Document, ids: &HashSet<&str>, fields: &[String]) -> bool {
    let row_selected = doc
        .get("_id")
        .and_then(Value::as_str)
        .is_some_and(|id| ids.contains(id));

    let mut changed = false;
    for field in fields {
        if row_selected {
            changed |= doc.remove(field).is_some();
        } else if let Some(value) = doc.get_mut(field) {
            changed |= remove_labels(value, ids);
        }
    }
    changed
}
