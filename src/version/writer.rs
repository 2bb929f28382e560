//! version/writer - ArchiveWriter.
//!
//! Pure append: one archive row per call, never an update. The row carries the
//! version, tombstone flag, `updated_at` from the registry clock, the encoded
//! snapshot, copies of the key columns and the actor. A unique (key, version)
//! collision comes back from storage as `VersionError::Conflict`.

use anyhow::{Context, Result};
use log::debug;

use crate::clock::Clock;
use crate::consts::{DATA_COLUMN, DELETED_COLUMN, UPDATED_AT_COLUMN, VERSION_COLUMN};
use crate::error::VersionError;
use crate::metrics::record_archive_append;
use crate::payload::{encode, snapshot_to_payload, PayloadKind};
use crate::registry::TableHandle;
use crate::row::{Row, VersionKey};
use crate::store::Transaction;
use crate::value::{ColumnType, Value};

#[derive(Debug, Clone, Copy)]
pub struct ArchiveEntry<'a> {
    pub key: &'a VersionKey,
    pub version: u64,
    pub deleted: bool,
    /// Live row image the snapshot is taken from.
    pub image: &'a Row,
    pub actor: Option<&'a str>,
}

pub struct ArchiveWriter<'r> {
    handle: &'r TableHandle,
    clock: &'r dyn Clock,
}

impl<'r> ArchiveWriter<'r> {
    pub fn new(handle: &'r TableHandle, clock: &'r dyn Clock) -> Self {
        Self { handle, clock }
    }

    /// Append `entry`, returning the storage-generated log_id.
    pub fn append(&self, txn: &mut dyn Transaction, entry: &ArchiveEntry<'_>) -> Result<u64> {
        let row = self.build_row(entry)?;
        let log_id = txn
            .insert(self.handle.archive_table(), row)
            .with_context(|| {
                format!(
                    "append {} v{} to {}",
                    entry.key,
                    entry.version,
                    self.handle.archive_table()
                )
            })?;
        record_archive_append(entry.deleted);
        debug!(
            "archive {}: log_id={} {} v{}{}",
            self.handle.archive_table(),
            log_id,
            entry.key,
            entry.version,
            if entry.deleted { " (tombstone)" } else { "" }
        );
        Ok(log_id)
    }

    fn build_row(&self, entry: &ArchiveEntry<'_>) -> Result<Row> {
        if entry.version > i64::MAX as u64 {
            return Err(VersionError::validation(format!(
                "version {} of {} is out of range",
                entry.version, entry.key
            ))
            .into());
        }
        let payload = snapshot_to_payload(entry.image, self.handle.ignored())?;
        let bytes = encode(&payload, PayloadKind::Object)?;
        let data = match self
            .handle
            .archive_schema()
            .get_column(DATA_COLUMN)
            .map(|c| c.ty)
        {
            Some(ColumnType::Text) => Value::Text(
                String::from_utf8(bytes).map_err(|e| VersionError::encoding(e.to_string()))?,
            ),
            _ => Value::Json(payload),
        };

        let mut row = Row::new()
            .with(VERSION_COLUMN, entry.version as i64)
            .with(DELETED_COLUMN, entry.deleted)
            .with(UPDATED_AT_COLUMN, self.clock.now())
            .with(DATA_COLUMN, data)
            .with(self.handle.actor_column(), entry.actor);
        entry.key.apply_to(&mut row);
        Ok(row)
    }
}
