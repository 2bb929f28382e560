//! version/interceptor - change set -> archive entries.
//!
//! `before_commit` runs once per unit of work, after the live mutations are
//! applied to the transaction and before storage commit:
//! - Insert: entry at next_version(key).
//! - Update: column-level dirty check over non-ignored columns. Clean => nothing.
//!   Key changed => tombstone for the old key (pre-change image), then an entry
//!   for the new key (post-change image). Otherwise one entry.
//! - Delete: tombstone with the last known image.
//! After Insert/Update the live row's log_ref points at the new entry.

use anyhow::{anyhow, Result};
use log::debug;

use crate::metrics::record_update_skipped;
use crate::registry::{Registry, TableHandle};
use crate::row::Row;
use crate::store::Transaction;
use crate::value::Value;

use super::next_version;
use super::writer::{ArchiveEntry, ArchiveWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One live mutation with its before/after images.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    pub table: String,
    pub rowid: u64,
    pub before: Option<Row>,
    pub after: Option<Row>,
}

impl ChangeRecord {
    pub fn insert(table: &str, rowid: u64, after: Row) -> Self {
        Self {
            kind: ChangeKind::Insert,
            table: table.to_string(),
            rowid,
            before: None,
            after: Some(after),
        }
    }

    pub fn update(table: &str, rowid: u64, before: Row, after: Row) -> Self {
        Self {
            kind: ChangeKind::Update,
            table: table.to_string(),
            rowid,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(table: &str, rowid: u64, before: Row) -> Self {
        Self {
            kind: ChangeKind::Delete,
            table: table.to_string(),
            rowid,
            before: Some(before),
            after: None,
        }
    }
}

/// Non-ignored columns whose value differs between `before` and `after`.
pub fn dirty_columns(handle: &TableHandle, before: &Row, after: &Row) -> Vec<String> {
    let mut cols: Vec<&str> = before.columns().chain(after.columns()).collect();
    cols.sort_unstable();
    cols.dedup();
    cols.into_iter()
        .filter(|c| !handle.is_ignored(c) && before.value(c) != after.value(c))
        .map(|c| c.to_string())
        .collect()
}

/// Write the archive entries for `changes`. Returns the new log_ids in write order.
pub fn before_commit(
    registry: &Registry,
    txn: &mut dyn Transaction,
    changes: &[ChangeRecord],
    actor: Option<&str>,
) -> Result<Vec<u64>> {
    let mut log_ids = Vec::new();
    for ch in changes {
        let handle = registry.handle_for(&ch.table)?;
        let writer = ArchiveWriter::new(&handle, registry.clock());
        match ch.kind {
            ChangeKind::Insert => {
                let after = image(ch, ch.after.as_ref())?;
                let key = handle.key_of(after)?;
                let version = next_version(&*txn, &handle, &key)?;
                let id = writer.append(
                    txn,
                    &ArchiveEntry {
                        key: &key,
                        version,
                        deleted: false,
                        image: after,
                        actor,
                    },
                )?;
                set_log_ref(txn, &handle, ch.rowid, id)?;
                log_ids.push(id);
            }
            ChangeKind::Update => {
                let before = image(ch, ch.before.as_ref())?;
                let after = image(ch, ch.after.as_ref())?;
                let dirty = dirty_columns(&handle, before, after);
                if dirty.is_empty() {
                    record_update_skipped();
                    debug!("{} row {}: no versioned column changed", ch.table, ch.rowid);
                    continue;
                }
                let old_key = handle.key_of(before)?;
                let new_key = handle.key_of(after)?;
                if old_key != new_key {
                    let version = next_version(&*txn, &handle, &old_key)?;
                    let id = writer.append(
                        txn,
                        &ArchiveEntry {
                            key: &old_key,
                            version,
                            deleted: true,
                            image: before,
                            actor,
                        },
                    )?;
                    log_ids.push(id);
                }
                let version = next_version(&*txn, &handle, &new_key)?;
                let id = writer.append(
                    txn,
                    &ArchiveEntry {
                        key: &new_key,
                        version,
                        deleted: false,
                        image: after,
                        actor,
                    },
                )?;
                set_log_ref(txn, &handle, ch.rowid, id)?;
                log_ids.push(id);
            }
            ChangeKind::Delete => {
                let before = image(ch, ch.before.as_ref())?;
                let key = handle.key_of(before)?;
                let version = next_version(&*txn, &handle, &key)?;
                let id = writer.append(
                    txn,
                    &ArchiveEntry {
                        key: &key,
                        version,
                        deleted: true,
                        image: before,
                        actor,
                    },
                )?;
                log_ids.push(id);
            }
        }
    }
    Ok(log_ids)
}

fn image<'c>(ch: &ChangeRecord, img: Option<&'c Row>) -> Result<&'c Row> {
    img.ok_or_else(|| anyhow!("{:?} on {} row {} lacks a row image", ch.kind, ch.table, ch.rowid))
}

// The row may be gone already if a later change of the same unit of work deleted it.
fn set_log_ref(txn: &mut dyn Transaction, handle: &TableHandle, rowid: u64, log_id: u64) -> Result<()> {
    let Some(mut row) = txn.get(handle.live_table(), rowid)? else {
        return Ok(());
    };
    row.set(handle.log_ref_column(), Value::Int(log_id as i64));
    txn.update(handle.live_table(), rowid, row)
}
