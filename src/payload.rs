//! payload - JSON codec for archive `data` snapshots.
//!
//! - encode(value, kind): serialize a JSON document, rejecting the wrong container kind.
//! - decode(bytes, kind): parse and enforce the same container kind.
//! - snapshot_to_payload: canonical JSON object of a live row image
//!   (timestamps as RFC 3339 text, ignored columns dropped). Non-finite floats
//!   have no JSON form and are rejected with an Encoding error.
//! - payload_to_row: typed view of a stored payload (CLI rendering).
//!
//! Old archive rows keep whatever shape they were written with; decode never
//! reconciles payloads against the current schema.

use anyhow::Result;
use serde_json::{Map, Value as Json};

use crate::error::VersionError;
use crate::row::Row;
use crate::value::{ColumnType, Value};

/// Declared container kind of a payload document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Object,
    Array,
}

impl PayloadKind {
    fn check(self, v: &Json) -> Result<()> {
        let ok = match self {
            PayloadKind::Object => v.is_object(),
            PayloadKind::Array => v.is_array(),
        };
        if ok {
            Ok(())
        } else {
            Err(VersionError::encoding(format!("expected a JSON {:?}, got {}", self, kind_name(v))).into())
        }
    }
}

fn kind_name(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

pub fn encode(v: &Json, kind: PayloadKind) -> Result<Vec<u8>> {
    kind.check(v)?;
    serde_json::to_vec(v).map_err(|e| VersionError::encoding(format!("serialize payload: {}", e)).into())
}

pub fn decode(bytes: &[u8], kind: PayloadKind) -> Result<Json> {
    let v: Json = serde_json::from_slice(bytes)
        .map_err(|e| VersionError::encoding(format!("parse payload: {}", e)))?;
    kind.check(&v)?;
    Ok(v)
}

/// Snapshot of every column of `row` not listed in `ignored`.
pub fn snapshot_to_payload(row: &Row, ignored: &[String]) -> Result<Json> {
    let mut m = Map::new();
    for (col, v) in row.iter() {
        if ignored.iter().any(|c| c == col) {
            continue;
        }
        if let Value::Float(x) = v {
            if !x.is_finite() {
                return Err(VersionError::encoding(format!(
                    "column '{}' holds {}, which has no JSON representation",
                    col, x
                ))
                .into());
            }
        }
        m.insert(col.to_string(), v.to_json());
    }
    Ok(Json::Object(m))
}

/// Read one field back out of a stored payload. Missing fields are Null.
pub fn field(payload: &Json, col: &str) -> Json {
    payload.get(col).cloned().unwrap_or(Json::Null)
}

/// Typed view of a payload given the live column types; unknown or missing
/// columns come back as `Value::Null`.
pub fn payload_to_row(payload: &Json, columns: &[(String, ColumnType)]) -> Result<Row> {
    let obj = payload
        .as_object()
        .ok_or_else(|| VersionError::encoding("payload is not a JSON object"))?;
    let mut row = Row::new();
    for (name, ty) in columns {
        let v = match obj.get(name) {
            Some(j) => Value::from_json(j, *ty)?,
            None => Value::Null,
        };
        row.set(name, v);
    }
    Ok(row)
}
