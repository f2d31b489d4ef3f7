//! Row encoding.
//!
//! Object fields become string columns named after the field. `timestamp` and
//! `updated` are epoch milliseconds, flags are `"true"`/`"false"`, the version
//! is a number column present only when positive. Open attributes keep their
//! JSON type through the matching DynamoDB type: strings stay strings,
//! numbers become number columns, booleans, lists and maps use the native
//! types. A string column is never parsed, so `"42"` reads back as the string
//! `"42"`. Blank strings and nulls at the top level are omitted.

use chrono::DateTime;
use serde_json::{Number, Value};

use crate::tenant::TenantPartition;
use crate::types::{RESERVED_ATTRIBUTES, StorableObject};

use super::client::{APPID_COLUMN, AttrValue, ID_COLUMN, KEY_COLUMN, Row, VERSION_COLUMN};

const TYPE_COLUMN: &str = "type";
const TIMESTAMP_COLUMN: &str = "timestamp";
const UPDATED_COLUMN: &str = "updated";
const STORED_COLUMN: &str = "stored";
const INDEXED_COLUMN: &str = "indexed";
const CACHED_COLUMN: &str = "cached";

fn put_string(row: &mut Row, column: &str, value: &str) {
    if !value.trim().is_empty() {
        row.insert(column.to_string(), AttrValue::S(value.to_string()));
    }
}

fn put_flag(row: &mut Row, column: &str, value: bool) {
    row.insert(column.to_string(), AttrValue::S(value.to_string()));
}

/// Encodes an object into a row of the partition's table.
pub(crate) fn encode_row(partition: &TenantPartition, object: &StorableObject) -> Row {
    let mut row = Row::new();

    row.insert(
        KEY_COLUMN.to_string(),
        AttrValue::S(partition.row_key(object.id())),
    );
    put_string(&mut row, ID_COLUMN, object.id());
    put_string(&mut row, TYPE_COLUMN, object.object_type());
    put_string(&mut row, APPID_COLUMN, partition.canonical_id());

    if let Some(ts) = object.timestamp() {
        put_string(&mut row, TIMESTAMP_COLUMN, &ts.timestamp_millis().to_string());
    }
    if let Some(updated) = object.updated() {
        put_string(
            &mut row,
            UPDATED_COLUMN,
            &updated.timestamp_millis().to_string(),
        );
    }

    put_flag(&mut row, STORED_COLUMN, object.is_stored());
    put_flag(&mut row, INDEXED_COLUMN, object.is_indexed());
    put_flag(&mut row, CACHED_COLUMN, object.is_cached());

    if object.version() > 0 {
        row.insert(
            VERSION_COLUMN.to_string(),
            AttrValue::N(object.version().to_string()),
        );
    }

    for (name, value) in object.attributes() {
        if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        match value {
            Value::Null => {}
            Value::String(s) => put_string(&mut row, name, s),
            other => {
                row.insert(name.clone(), encode_value(other));
            }
        }
    }

    row
}

/// Encodes the columns written by a partial update: no key, no version.
pub(crate) fn encode_update(partition: &TenantPartition, object: &StorableObject) -> Row {
    let mut row = encode_row(partition, object);
    row.remove(KEY_COLUMN);
    row.remove(VERSION_COLUMN);
    row
}

fn parse_millis(value: &AttrValue) -> Option<DateTime<chrono::Utc>> {
    value
        .as_str()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

fn parse_flag(row: &Row, column: &str) -> bool {
    row.get(column).map(|v| v.as_str() != "false").unwrap_or(true)
}

fn encode_value(value: &Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(b) => AttrValue::Bool(*b),
        Value::Number(n) => AttrValue::N(n.to_string()),
        Value::String(s) => AttrValue::S(s.clone()),
        Value::Array(items) => AttrValue::L(items.iter().map(encode_value).collect()),
        Value::Object(fields) => AttrValue::M(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect(),
        ),
    }
}

fn decode_value(value: &AttrValue) -> Value {
    match value {
        AttrValue::S(s) => Value::String(s.clone()),
        AttrValue::N(n) => serde_json::from_str::<Number>(n)
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(n.clone())),
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Null => Value::Null,
        AttrValue::L(items) => Value::Array(items.iter().map(decode_value).collect()),
        AttrValue::M(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect(),
        ),
    }
}

/// Returns the row key column.
pub(crate) fn row_key(row: &Row) -> Option<&str> {
    row.get(KEY_COLUMN).map(AttrValue::as_str)
}

/// Returns `true` if the row belongs to the partition's tenant.
pub(crate) fn is_owned_by(partition: &TenantPartition, row: &Row) -> bool {
    row_key(row).is_some_and(|key| {
        partition.owns_row(key, row.get(APPID_COLUMN).map(AttrValue::as_str))
    })
}

/// Decodes a row of the partition's table.
pub(crate) fn decode_row(partition: &TenantPartition, row: &Row) -> StorableObject {
    let id = match row.get(ID_COLUMN) {
        Some(id) => id.as_str().to_string(),
        None => partition
            .object_id(row_key(row).unwrap_or_default())
            .to_string(),
    };
    let object_type = row
        .get(TYPE_COLUMN)
        .map(|v| v.as_str().to_string())
        .unwrap_or_default();

    let mut object = StorableObject::new(object_type, id).with_tenant(partition.tenant_id().clone());
    object.set_version(
        row.get(VERSION_COLUMN)
            .and_then(|v| v.as_str().parse::<i64>().ok())
            .unwrap_or(0),
    );
    object.set_timestamp(row.get(TIMESTAMP_COLUMN).and_then(parse_millis));
    object.set_updated(row.get(UPDATED_COLUMN).and_then(parse_millis));
    object.set_stored(parse_flag(row, STORED_COLUMN));
    object.set_indexed(parse_flag(row, INDEXED_COLUMN));
    object.set_cached(parse_flag(row, CACHED_COLUMN));

    let attributes = object.attributes_mut();
    for (name, value) in row {
        if RESERVED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        attributes.insert(name.clone(), decode_value(value));
    }

    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{PartitionResolver, RoutingConfig, TenantId};
    use crate::types::now_millis;
    use serde_json::json;

    fn partition(tenant: &str) -> std::sync::Arc<TenantPartition> {
        PartitionResolver::new(RoutingConfig::default())
            .resolve(&TenantId::new(tenant))
            .unwrap()
    }

    #[test]
    fn test_encode_columns() {
        let p = partition(" acme");
        let obj = StorableObject::new("user", "u1")
            .with_version(3)
            .with_attribute("name", json!("Ada"))
            .with_attribute("age", json!(36))
            .with_attribute("blank", json!("  "))
            .with_attribute("gone", Value::Null);
        let row = encode_row(&p, &obj);

        assert_eq!(row.get("key"), Some(&AttrValue::S("acme_u1".to_string())));
        assert_eq!(row.get("appid"), Some(&AttrValue::S("acme".to_string())));
        assert_eq!(row.get("version"), Some(&AttrValue::N("3".to_string())));
        assert_eq!(row.get("stored"), Some(&AttrValue::S("true".to_string())));
        assert_eq!(row.get("age"), Some(&AttrValue::N("36".to_string())));
        assert!(!row.contains_key("blank"));
        assert!(!row.contains_key("gone"));
        assert!(!row.contains_key("timestamp"));
    }

    #[test]
    fn test_version_column_omitted_without_positive_version() {
        let p = partition("acme");
        let row = encode_row(&p, &StorableObject::new("user", "u1").with_version(-1));
        assert!(!row.contains_key("version"));
    }

    #[test]
    fn test_decode_restores_object() {
        let p = partition(" acme");
        let obj = StorableObject::new("user", "u1")
            .with_tenant(" acme")
            .with_version(2)
            .with_timestamp(now_millis())
            .with_flags(true, false, true)
            .with_attribute("name", json!("Ada"))
            .with_attribute("tags", json!(["a", "b"]))
            .with_attribute("active", json!(true));

        let decoded = decode_row(&p, &encode_row(&p, &obj));
        assert_eq!(decoded, obj);
    }

    #[test]
    fn test_string_attributes_are_never_parsed() {
        let p = partition("acme");
        let obj = StorableObject::new("user", "u1")
            .with_attribute("flag", json!("true"))
            .with_attribute("zip", json!("42"))
            .with_attribute("note", json!("null"))
            .with_attribute("raw", json!("{\"a\":1}"));

        let decoded = decode_row(&p, &encode_row(&p, &obj));
        assert_eq!(decoded.attribute("flag"), Some(&json!("true")));
        assert_eq!(decoded.attribute("zip"), Some(&json!("42")));
        assert_eq!(decoded.attribute("note"), Some(&json!("null")));
        assert_eq!(decoded.attribute("raw"), Some(&json!("{\"a\":1}")));
    }

    #[test]
    fn test_json_types_use_native_columns() {
        let p = partition("acme");
        let obj = StorableObject::new("user", "u1")
            .with_attribute("score", json!(1.5))
            .with_attribute("active", json!(false))
            .with_attribute("address", json!({"city": "Oslo", "unit": null, "floors": [1, 2]}));
        let row = encode_row(&p, &obj);

        assert_eq!(row.get("score"), Some(&AttrValue::N("1.5".to_string())));
        assert_eq!(row.get("active"), Some(&AttrValue::Bool(false)));
        assert!(matches!(row.get("address"), Some(AttrValue::M(_))));

        let decoded = decode_row(&p, &row);
        assert_eq!(decoded.attributes(), obj.attributes());
    }

    #[test]
    fn test_update_columns_exclude_key_and_version() {
        let p = partition("acme");
        let row = encode_update(&p, &StorableObject::new("user", "u1").with_version(5));
        assert!(!row.contains_key("key"));
        assert!(!row.contains_key("version"));
        assert!(row.contains_key("id"));
    }

    #[test]
    fn test_decode_without_id_column_uses_key() {
        let p = partition(" acme");
        let mut row = Row::new();
        row.insert("key".to_string(), AttrValue::S("acme_x9".to_string()));
        let decoded = decode_row(&p, &row);
        assert_eq!(decoded.id(), "x9");
        assert!(decoded.is_cached());
    }
}
