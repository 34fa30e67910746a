//! Inbound argument decoding
//!
//! Client requests carry JSON arguments plus a positional list of objects.
//! Arguments refer to those objects with `{"__dh_obid": n}` markers.

use serde_json::Value as Json;

use plinth_core::{ObjectRef, Props, Value};

use crate::encoder::OBJECT_KEY;
use crate::error::{Result, WireError};

/// Decode JSON-RPC `params` into callable arguments
///
/// An array becomes the argument list, `null` or a missing value no arguments,
/// and anything else a single argument.
pub fn decode_args(params: &Json, references: &[ObjectRef]) -> Result<Vec<Value>> {
    match params {
        Json::Null => Ok(Vec::new()),
        Json::Array(items) => items
            .iter()
            .map(|item| decode_value(item, references))
            .collect(),
        other => Ok(vec![decode_value(other, references)?]),
    }
}

/// Decode one JSON value, resolving object markers against `references`
pub fn decode_value(json: &Json, references: &[ObjectRef]) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().ok_or_else(|| {
                WireError::InvalidMessage(format!("unrepresentable number {n}"))
            })?),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(|item| decode_value(item, references))
                .collect::<Result<Vec<_>>>()?,
        ),
        Json::Object(map) => {
            if let Some(index) = object_marker(map)? {
                let object = usize::try_from(index)
                    .ok()
                    .and_then(|i| references.get(i))
                    .ok_or(WireError::UnknownReference { index })?;
                return Ok(Value::Object(object.clone()));
            }
            let mut props = Props::with_capacity(map.len());
            for (key, item) in map {
                props.insert(key.clone(), decode_value(item, references)?);
            }
            Value::Map(props)
        }
    })
}

fn object_marker(map: &serde_json::Map<String, Json>) -> Result<Option<u64>> {
    if map.len() != 1 {
        return Ok(None);
    }
    match map.get(OBJECT_KEY) {
        None => Ok(None),
        Some(index) => index
            .as_u64()
            .map(Some)
            .ok_or_else(|| WireError::InvalidMessage(format!("malformed object reference {index}"))),
    }
}
