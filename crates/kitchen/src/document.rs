//! Tree-shaped attribute documents and the merge rules between them.
//!
//! A [`Document`] is a JSON object. Objects are the only values that merge;
//! arrays, strings, numbers, booleans and null are always replaced whole.
//! `serde_json::Map` keeps keys sorted, so two documents built from the same
//! inputs serialize to the same bytes.

use serde_json::Value;

/// A nested key/value attribute document.
pub type Document = serde_json::Map<String, Value>;

/// Deep-merge `overlay` into `base`.
///
/// Keys whose overlay value is an object recurse; every other overlay value
/// replaces whatever `base` held under that key. Keys only present in `base`
/// are left untouched.
pub fn merge(base: &mut Document, overlay: &Document) {
    for (key, value) in overlay {
        match value {
            Value::Object(nested) => {
                let slot = base
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Document::new()));
                merge(as_document(slot), nested);
            }
            other => {
                base.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Store `value` at the nested location named by `path`.
///
/// Intermediate levels are created as empty objects (replacing any scalar
/// that was in the way). At the leaf the strings `"true"` and `"false"` become
/// booleans; anything else is cloned as-is. An empty path does nothing.
pub fn set_path<S: AsRef<str>>(doc: &mut Document, path: &[S], value: &Value) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };

    let mut cursor = doc;
    for segment in parents {
        let slot = cursor
            .entry(segment.as_ref().to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        cursor = as_document(slot);
    }

    cursor.insert(leaf.as_ref().to_string(), coerce_literal(value));
}

/// Split a cookbook attribute key (`"nginx/worker/count"`) into path segments.
pub fn split_attribute_key(key: &str) -> Vec<&str> {
    key.split('/').collect()
}

fn coerce_literal(value: &Value) -> Value {
    match value {
        Value::String(s) if s == "true" => Value::Bool(true),
        Value::String(s) if s == "false" => Value::Bool(false),
        other => other.clone(),
    }
}

fn as_document(slot: &mut Value) -> &mut Document {
    if !slot.is_object() {
        *slot = Value::Object(Document::new());
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just replaced with an object"),
    }
}
