//! Rows (column -> value maps) and version keys.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::VersionError;
use crate::value::Value;

/// One row image: column name -> value. Missing columns read as Null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style setter.
    pub fn with(mut self, col: &str, v: impl Into<Value>) -> Self {
        self.0.insert(col.to_string(), v.into());
        self
    }

    pub fn set(&mut self, col: &str, v: impl Into<Value>) {
        self.0.insert(col.to_string(), v.into());
    }

    pub fn get(&self, col: &str) -> Option<&Value> {
        self.0.get(col)
    }

    /// Value of `col`, Null when absent.
    pub fn value(&self, col: &str) -> Value {
        self.0.get(col).cloned().unwrap_or(Value::Null)
    }

    pub fn remove(&mut self, col: &str) -> Option<Value> {
        self.0.remove(col)
    }

    pub fn contains(&self, col: &str) -> bool {
        self.0.contains_key(col)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `changes` on top of this row.
    pub fn merged(&self, changes: &Row) -> Row {
        let mut out = self.clone();
        for (k, v) in changes.iter() {
            out.set(k, v.clone());
        }
        out
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for Row {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Self(m)
    }
}

/// Identity of "the same logical record" across time: the values of the
/// version-key columns, in declared column order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionKey(Vec<(String, Value)>);

impl VersionKey {
    pub fn new(parts: Vec<(String, Value)>) -> Self {
        Self(parts)
    }

    /// Extract the key of `row`. Every key column must be present and non-null.
    pub fn from_row(row: &Row, cols: &[String]) -> Result<Self> {
        let mut parts = Vec::with_capacity(cols.len());
        for c in cols {
            match row.get(c) {
                Some(v) if !v.is_null() => parts.push((c.clone(), v.clone())),
                _ => {
                    return Err(VersionError::validation(format!(
                        "version key column '{}' is missing or null",
                        c
                    ))
                    .into())
                }
            }
        }
        Ok(Self(parts))
    }

    pub fn parts(&self) -> &[(String, Value)] {
        &self.0
    }

    pub fn get(&self, col: &str) -> Option<&Value> {
        self.0.iter().find(|(c, _)| c == col).map(|(_, v)| v)
    }

    /// Does `row` carry exactly this key?
    pub fn matches(&self, row: &Row) -> bool {
        self.0
            .iter()
            .all(|(c, v)| row.get(c).map(|rv| rv == v).unwrap_or(false))
    }

    /// `{"col": value, ...}` in canonical JSON form.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(c, v)| (c.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Write the key columns into `row`.
    pub fn apply_to(&self, row: &mut Row) {
        for (c, v) in &self.0 {
            row.set(c, v.clone());
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (c, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", c, v)?;
        }
        Ok(())
    }
}
