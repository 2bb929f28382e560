//! query/conds - key condition validation.
//!
//! A condition map names every version key column exactly once (and nothing
//! else); the list of maps is OR-ed. Everything is checked before any I/O.

use anyhow::Result;

use crate::error::VersionError;
use crate::registry::TableHandle;
use crate::row::Row;
use crate::value::Value;

/// Validate `conds` against `handle` and return them as key-ordered equality lists.
pub fn resolve_conds(handle: &TableHandle, conds: &[Row]) -> Result<Vec<Vec<(String, Value)>>> {
    let key = handle.version_key();
    let mut out = Vec::with_capacity(conds.len());
    for (i, cond) in conds.iter().enumerate() {
        if cond.len() != key.len() {
            return Err(VersionError::validation(format!(
                "condition #{} has {} column(s), version key of '{}' has {} ({})",
                i,
                cond.len(),
                handle.live_table(),
                key.len(),
                key.join(", ")
            ))
            .into());
        }
        if let Some(bad) = cond.columns().find(|c| !key.iter().any(|k| k == c)) {
            return Err(VersionError::validation(format!(
                "condition #{} names '{}', which is not a version key column of '{}'",
                i,
                bad,
                handle.live_table()
            ))
            .into());
        }
        let mut parts = Vec::with_capacity(key.len());
        for k in key {
            let v = cond.value(k);
            let expected = handle.live_schema().get_column(k).map(|c| c.ty);
            match v.column_type() {
                None => {
                    return Err(VersionError::validation(format!(
                        "condition #{}: '{}' must not be null",
                        i, k
                    ))
                    .into())
                }
                Some(ty) if Some(ty) != expected => {
                    return Err(VersionError::validation(format!(
                        "condition #{}: '{}' expects {}, got {}",
                        i,
                        k,
                        expected.map(|t| t.to_string()).unwrap_or_default(),
                        ty
                    ))
                    .into())
                }
                Some(_) => parts.push((k.clone(), v)),
            }
        }
        out.push(parts);
    }
    Ok(out)
}
