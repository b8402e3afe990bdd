//! Ticket metadata document
//!
//! Everything that has no record column lives in one consolidated JSON
//! document per ticket, plus a handful of flat meta keys kept for readers
//! that look fields up individually.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub type MetaDocument = Map<String, Value>;

/// Meta store keys
pub mod keys {
    pub const TICKET_DATA: &str = "ticket_data";
    pub const USER_IP: &str = "ticket_user_ip";
    pub const CUSTOMER_ID: &str = "ticket_customer_id";
    pub const USER_ID: &str = "ticket_user_id";
    pub const USER_EMAIL: &str = "ticket_user_email";
    pub const TICKET_KEY: &str = "ticket_key";
    pub const SLA: &str = "ticket_sla";
    pub const COMPLETED_DATE: &str = "ticket_completed_date";
    pub const FORM_ID: &str = "ticket_form_id";
    pub const FORM_DATA: &str = "ticket_form_data";

    pub const REPLY_CUSTOMER_ID: &str = "reply_customer_id";
    pub const REPLY_AGENT: &str = "reply_agent";
    pub const REPLY_RESOLUTION: &str = "reply_resolution";
}

/// Fields of the consolidated document
pub mod fields {
    pub const AGENT: &str = "agent";
    pub const SOURCE: &str = "source";
    pub const SLA: &str = "sla";
    pub const USER_INFO: &str = "user_info";
    pub const USER_IP: &str = "user_ip";
    pub const RESOLVED: &str = "resolved";
    pub const FILES: &str = "files";
}

/// Stored value as a document; anything but an object reads as empty
pub fn as_document(value: Option<Value>) -> MetaDocument {
    match value {
        Some(Value::Object(doc)) => doc,
        _ => MetaDocument::new(),
    }
}

/// Typed read of one document field. Missing or malformed values are `None`.
pub fn read<T: DeserializeOwned>(doc: &MetaDocument, field: &str) -> Option<T> {
    doc.get(field)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

pub fn read_str<'a>(doc: &'a MetaDocument, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Overlay `update` onto `base`. Nested objects merge key by key, nulls in
/// the update are treated as absent, everything else replaces.
pub fn deep_merge(base: &mut Value, update: &Value) {
    match (base, update) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(update)) => {
            for (key, value) in update {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None if !value.is_null() => {
                        base.insert(key.clone(), value.clone());
                    }
                    None => {}
                }
            }
        }
        (base, update) => *base = update.clone(),
    }
}

/// Merge freshly flushed fields over the stored document.
///
/// Top-level keys from `update` win; `user_info` is deep-merged so keys the
/// update does not carry keep their stored values.
pub fn merge_document(stored: &MetaDocument, update: &MetaDocument) -> MetaDocument {
    let mut merged = stored.clone();
    for (key, value) in update {
        let nested = key == fields::USER_INFO && merged.get(key).is_some_and(Value::is_object);
        match merged.get_mut(key) {
            Some(existing) if nested => deep_merge(existing, value),
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// SHA-256 over the canonical JSON form of the document
pub fn fingerprint(doc: &MetaDocument) -> String {
    let canonical = canonicalize(&Value::Object(doc.clone())).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

// Rebuild objects with sorted keys so insertion order never changes the hash.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(value: Value) -> MetaDocument {
        as_document(Some(value))
    }

    #[test]
    fn test_new_values_win_at_top_level() {
        let stored = doc(json!({"agent": 3, "source": 1, "custom": "kept"}));
        let update = doc(json!({"agent": 5, "files": [1, 2]}));

        let merged = merge_document(&stored, &update);
        assert_eq!(Value::Object(merged), json!({"agent": 5, "source": 1, "custom": "kept", "files": [1, 2]}));
    }

    #[test]
    fn test_user_info_is_deep_merged() {
        let stored = doc(json!({"user_info": {"first_name": "Jane", "last_name": "Doe", "phone": "555"}}));
        let update = doc(json!({"user_info": {"first_name": "Janet", "email": "j@x.com", "last_name": null}}));

        let merged = merge_document(&stored, &update);
        assert_eq!(
            merged["user_info"],
            json!({"first_name": "Janet", "last_name": "Doe", "phone": "555", "email": "j@x.com"})
        );
    }

    #[test]
    fn test_user_info_replaces_non_object() {
        let stored = doc(json!({"user_info": "garbage"}));
        let update = doc(json!({"user_info": {"email": "j@x.com"}}));
        assert_eq!(merge_document(&stored, &update)["user_info"], json!({"email": "j@x.com"}));
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = doc(json!({"a": 1, "b": {"x": 1, "y": 2}}));
        let mut b = MetaDocument::new();
        b.insert("b".into(), json!({"y": 2, "x": 1}));
        b.insert("a".into(), json!(1));
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&doc(json!({"a": 2}))));
    }

    #[test]
    fn test_read_helpers() {
        let d = doc(json!({"files": [4, 5], "user_ip": "", "agent": null}));
        assert_eq!(read::<Vec<u64>>(&d, "files"), Some(vec![4, 5]));
        assert_eq!(read::<u64>(&d, "agent"), None);
        assert_eq!(read_str(&d, "user_ip"), None);
        assert!(as_document(Some(json!([1]))).is_empty());
    }

    proptest! {
        #[test]
        fn prop_merging_stored_values_is_a_no_op(
            entries in proptest::collection::btree_map("[a-z_]{1,8}", "[a-z0-9 ]{0,12}", 0..8),
            first in "[A-Za-z]{0,10}",
        ) {
            let mut stored = MetaDocument::new();
            for (k, v) in &entries {
                stored.insert(k.clone(), json!(v));
            }
            stored.insert(fields::USER_INFO.into(), json!({"first_name": first}));

            let merged = merge_document(&stored, &stored.clone());
            prop_assert_eq!(fingerprint(&merged), fingerprint(&stored));
        }
    }
}
