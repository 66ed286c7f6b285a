//! JSON document form of a resource.
//!
//! Top level: `:type`, `:owners`, `:admins`, `acl`, `app_perms`; every other
//! key is a property. Inside a property: `:datatype`, other `:` attributes,
//! `value`, `acl`, and child properties as nested objects.

use odyn_types::{Datatype, PropValue, ResourcePath, ResourceType};
use serde::Serialize;
use serde_json::{Map, Value};

use super::data::{ACL_KEY, APP_PERMS_KEY, DATATYPE_ATTR, NodeId, ResourceData, VALUE_KEY};
use crate::error::{StoreError, StoreResult};
use crate::policy::{Acl, AppPolicy};

const TYPE_KEY: &str = ":type";
const OWNERS_KEY: &str = ":owners";
const ADMINS_KEY: &str = ":admins";

/// Decode a stored document.
pub fn decode(doc: &Value) -> StoreResult<ResourceData> {
    let Value::Object(map) = doc else {
        return Err(StoreError::corrupt("document is not a JSON object"));
    };

    let mut data = ResourceData::new();
    for (key, value) in map {
        match key.as_str() {
            TYPE_KEY => {
                let tag = value
                    .as_str()
                    .and_then(|s| s.parse::<ResourceType>().ok())
                    .ok_or_else(|| StoreError::corrupt(format!("bad {TYPE_KEY}: {value}")))?;
                data.type_tag = Some(tag);
            }
            OWNERS_KEY => data.owners = decode_paths(key, value)?,
            ADMINS_KEY => data.admins = decode_paths(key, value)?,
            ACL_KEY => data.acl = Some(decode_acl("resource", value)?),
            APP_PERMS_KEY => {
                let policy = AppPolicy::from_json(value)
                    .map_err(|e| StoreError::corrupt(format!("{APP_PERMS_KEY}: {e}")))?;
                data.app_perms = Some(policy);
            }
            _ if key.starts_with(':') => {
                return Err(StoreError::corrupt(format!("unknown resource key '{key}'")));
            }
            name => {
                let id = data
                    .insert_root(name, property_datatype(name, value)?)
                    .map_err(|e| StoreError::corrupt(e.to_string()))?;
                decode_property(&mut data, id, value)?;
            }
        }
    }
    data.clear_modified();
    Ok(data)
}

fn decode_paths(key: &str, value: &Value) -> StoreResult<Vec<ResourcePath>> {
    let bad = || StoreError::corrupt(format!("{key} must be a list of resource paths"));
    value
        .as_array()
        .ok_or_else(bad)?
        .iter()
        .map(|v| {
            v.as_str()
                .and_then(|s| ResourcePath::parse(s).ok())
                .ok_or_else(bad)
        })
        .collect()
}

fn decode_acl(owner: &str, value: &Value) -> StoreResult<Acl> {
    Acl::from_json(value).map_err(|e| StoreError::corrupt(format!("acl of {owner}: {e}")))
}

/// Read `:datatype` from a property object; absent means `void`.
fn property_datatype(name: &str, value: &Value) -> StoreResult<Datatype> {
    let Value::Object(map) = value else {
        return Err(StoreError::corrupt(format!("property '{name}' is not an object")));
    };
    match map.get(DATATYPE_ATTR) {
        None if map.contains_key(VALUE_KEY) => Err(StoreError::corrupt(format!(
            "property '{name}' has a value but no {DATATYPE_ATTR}"
        ))),
        None => Ok(Datatype::Void),
        Some(tag) => tag.as_str().and_then(Datatype::from_str).ok_or_else(|| {
            StoreError::corrupt(format!("property '{name}' has unknown datatype {tag}"))
        }),
    }
}

fn decode_property(data: &mut ResourceData, id: NodeId, value: &Value) -> StoreResult<()> {
    let Value::Object(map) = value else {
        return Err(StoreError::corrupt(format!(
            "property '{}' is not an object",
            data.dotted_name(id)
        )));
    };

    for (key, item) in map {
        match key.as_str() {
            DATATYPE_ATTR => {}
            VALUE_KEY => {
                let value = PropValue::from_json(item).ok_or_else(|| {
                    StoreError::corrupt(format!("{}: value is not a scalar", data.dotted_name(id)))
                })?;
                data.set_value(id, value)
                    .map_err(|e| StoreError::corrupt(e.to_string()))?;
            }
            ACL_KEY => {
                let acl = decode_acl(&data.dotted_name(id), item)?;
                data.set_acl(id, Some(acl));
            }
            attr if attr.starts_with(':') => {
                let value = PropValue::from_json(item).ok_or_else(|| {
                    StoreError::corrupt(format!(
                        "{}: attribute {attr} is not a scalar",
                        data.dotted_name(id)
                    ))
                })?;
                data.set_attribute(id, attr, value)
                    .map_err(|e| StoreError::corrupt(e.to_string()))?;
            }
            name => {
                let child = data
                    .insert_child(id, name, property_datatype(name, item)?)
                    .map_err(|e| StoreError::corrupt(e.to_string()))?;
                decode_property(data, child, item)?;
            }
        }
    }
    Ok(())
}

/// Encode a resource into its document form.
///
/// Fails without side effects if a value has no JSON form (non-finite floats).
pub fn encode(data: &ResourceData) -> StoreResult<Value> {
    let mut map = Map::new();
    if let Some(tag) = data.type_tag {
        map.insert(TYPE_KEY.into(), Value::String(tag.as_str().into()));
    }
    if !data.owners.is_empty() {
        map.insert(OWNERS_KEY.into(), encode_paths(&data.owners));
    }
    if !data.admins.is_empty() {
        map.insert(ADMINS_KEY.into(), encode_paths(&data.admins));
    }
    if let Some(acl) = &data.acl {
        map.insert(ACL_KEY.into(), acl.to_json());
    }
    if let Some(policy) = &data.app_perms {
        map.insert(APP_PERMS_KEY.into(), policy.to_json());
    }
    for (name, id) in data.roots() {
        map.insert(name.clone(), encode_property(data, *id)?);
    }
    Ok(Value::Object(map))
}

fn encode_paths(paths: &[ResourcePath]) -> Value {
    Value::Array(paths.iter().map(|p| Value::String(p.to_string())).collect())
}

fn encode_property(data: &ResourceData, id: NodeId) -> StoreResult<Value> {
    let node = data.node(id);
    let mut map = Map::new();

    let is_bare_container = node.datatype() == Datatype::Void && node.value().is_null();
    if !is_bare_container {
        map.insert(DATATYPE_ATTR.into(), Value::String(node.datatype().as_str().into()));
        map.insert(VALUE_KEY.into(), json_scalar(data, id, node.value())?);
    }
    for (name, value) in node.attributes() {
        map.insert(name.clone(), json_scalar(data, id, value)?);
    }
    if let Some(acl) = node.acl() {
        map.insert(ACL_KEY.into(), acl.to_json());
    }
    for (name, child) in node.children() {
        map.insert(name.clone(), encode_property(data, *child)?);
    }
    Ok(Value::Object(map))
}

fn json_scalar(data: &ResourceData, id: NodeId, value: &PropValue) -> StoreResult<Value> {
    value.to_json().ok_or_else(|| {
        StoreError::type_mismatch(format!(
            "{}: {value} cannot be stored",
            data.dotted_name(id)
        ))
    })
}

/// Serialize a document the way it is written to disk: sorted keys,
/// four-space indentation.
pub fn to_pretty_bytes(doc: &Value) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)?;
    Ok(buf)
}

// ============================================================================
// Tests
// ============================================================================
