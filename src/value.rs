//! Typed column values and column types.
//!
//! `Value` is what rows are made of (live rows, archive rows, version keys).
//! It is totally ordered and hashable so that version keys can index maps and
//! unique constraints; floats compare with `total_cmp`, JSON by canonical text.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VersionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Column type of a non-null value.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Json(_) => Some(ColumnType::Json),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Canonical JSON form used inside archive payloads.
    /// Timestamps become RFC 3339 text (UTC, `Z` suffix). Non-finite floats become null here;
    /// archive snapshots refuse them instead (see `payload::snapshot_to_payload`).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Json(j) => j.clone(),
        }
    }

    /// Decode a canonical JSON value back into a typed value of `ty`.
    pub fn from_json(v: &serde_json::Value, ty: ColumnType) -> Result<Value> {
        if v.is_null() {
            return Ok(Value::Null);
        }
        let out = match ty {
            ColumnType::Bool => v.as_bool().map(Value::Bool),
            ColumnType::Int => v.as_i64().map(Value::Int),
            ColumnType::Float => v.as_f64().map(Value::Float),
            ColumnType::Text => v.as_str().map(|s| Value::Text(s.to_string())),
            ColumnType::Timestamp => v
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| Value::Timestamp(t.with_timezone(&Utc))),
            ColumnType::Json => Some(Value::Json(v.clone())),
        };
        out.ok_or_else(|| {
            VersionError::encoding(format!("json value {} is not of type {}", v, ty)).into()
        })
    }

    /// Parse a textual literal (CLI arguments) as a value of `ty`. "null" is Null.
    pub fn parse_as(s: &str, ty: ColumnType) -> Result<Value> {
        if s == "null" {
            return Ok(Value::Null);
        }
        let bad = || VersionError::validation(format!("cannot parse '{}' as {}", s, ty));
        let v = match ty {
            ColumnType::Bool => match s.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Value::Bool(true),
                "0" | "false" | "no" | "off" => Value::Bool(false),
                _ => return Err(bad().into()),
            },
            ColumnType::Int => Value::Int(s.trim().parse::<i64>().map_err(|_| bad())?),
            ColumnType::Float => Value::Float(s.trim().parse::<f64>().map_err(|_| bad())?),
            ColumnType::Text => Value::Text(s.to_string()),
            ColumnType::Timestamp => Value::Timestamp(parse_timestamp(s)?),
            ColumnType::Json => Value::Json(serde_json::from_str(s).map_err(|_| bad())?),
        };
        Ok(v)
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Timestamp(_) => 5,
            Value::Json(_) => 6,
        }
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or integer unix seconds.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(secs) = s.parse::<i64>() {
        if let Some(t) = DateTime::<Utc>::from_timestamp(secs, 0) {
            return Ok(t);
        }
    }
    Err(VersionError::validation(format!("invalid timestamp '{}'", s)).into())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Json(a), Value::Json(b)) => a.to_string().cmp(&b.to_string()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(x) => x.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Json(j) => j.to_string().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v.min(i64::MAX as u64) as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_canonical_form_is_rfc3339_utc() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let j = Value::Timestamp(t).to_json();
        assert_eq!(j, serde_json::json!("2024-03-01T12:30:05Z"));
        let back = Value::from_json(&j, ColumnType::Timestamp).unwrap();
        assert_eq!(back, Value::Timestamp(t));
    }

    #[test]
    fn from_json_rejects_wrong_type() {
        let err = Value::from_json(&serde_json::json!("ten"), ColumnType::Int).unwrap_err();
        assert!(crate::error::is_encoding(&err));
    }

    #[test]
    fn ordering_is_total_across_types() {
        let mut vals = vec![
            Value::Text("b".into()),
            Value::Int(3),
            Value::Null,
            Value::Float(f64::NAN),
            Value::Int(-1),
        ];
        vals.sort();
        assert_eq!(vals[0], Value::Null);
        assert_eq!(vals[1], Value::Int(-1));
        assert_eq!(vals[2], Value::Int(3));
        assert_eq!(vals[4], Value::Text("b".into()));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn parse_literals() {
        assert_eq!(Value::parse_as("42", ColumnType::Int).unwrap(), Value::Int(42));
        assert_eq!(Value::parse_as("on", ColumnType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::parse_as("null", ColumnType::Text).unwrap(), Value::Null);
        assert!(Value::parse_as("x", ColumnType::Int).is_err());
        let t = Value::parse_as("1970-01-01 00:00:10", ColumnType::Timestamp).unwrap();
        assert_eq!(t, Value::Timestamp(Utc.timestamp_opt(10, 0).unwrap()));
    }
}
