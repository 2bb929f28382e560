//! version - the write path of the versioning core.
//!
//! - mod.rs         - version resolver (latest_version)
//! - writer.rs      - ArchiveWriter: append one immutable archive entry
//! - interceptor.rs - turns a unit of work's change set into archive entries
//!
//! Write path: interceptor -> resolver -> writer, all inside the caller's transaction.

pub mod interceptor;
pub mod writer;

use anyhow::Result;

use crate::consts::VERSION_COLUMN;
use crate::error::VersionError;
use crate::registry::TableHandle;
use crate::row::VersionKey;
use crate::store::{Filter, Transaction};

pub use interceptor::{before_commit, ChangeKind, ChangeRecord};
pub use writer::{ArchiveEntry, ArchiveWriter};

/// max(version) over the archive rows of `key`, inside `txn` (own writes included).
pub fn latest_version(
    txn: &dyn Transaction,
    handle: &TableHandle,
    key: &VersionKey,
) -> Result<Option<u64>> {
    let max = txn.max(handle.archive_table(), VERSION_COLUMN, &Filter::all().key(key))?;
    match max {
        None => Ok(None),
        Some(v) => match v.as_i64() {
            Some(n) if n >= 0 => Ok(Some(n as u64)),
            _ => Err(VersionError::encoding(format!(
                "archive '{}' holds a non-integer version {} for {}",
                handle.archive_table(),
                v,
                key
            ))
            .into()),
        },
    }
}

/// Version the next entry of `key` gets: 0 for a fresh key, otherwise max + 1.
#[inline]
pub fn next_version(txn: &dyn Transaction, handle: &TableHandle, key: &VersionKey) -> Result<u64> {
    Ok(latest_version(txn, handle, key)?.map(|v| v + 1).unwrap_or(0))
}
