//! purge - irreversible removal of a key's live row and its whole archive history.
//!
//! One transaction: archive rows first, then live rows. Any failure rolls back
//! and nothing is removed. A later insert of the same key starts again at version 0.

use anyhow::{Context, Result};
use log::info;

use crate::error::VersionError;
use crate::metrics::record_purge;
use crate::query::resolve_conds;
use crate::registry::{Registry, TableHandle};
use crate::row::Row;
use crate::store::{Filter, Storage, Transaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub archive_rows: usize,
    pub live_rows: usize,
}

/// Delete archive and live rows of every key matched by `conds`, inside `txn`.
pub fn purge_in(txn: &mut dyn Transaction, h: &TableHandle, conds: &[Row]) -> Result<PurgeStats> {
    let keys = key_filter(h, conds)?;
    let mut stats = PurgeStats::default();

    for (rowid, _) in txn.select(h.archive_table(), &keys)? {
        if txn.delete(h.archive_table(), rowid)? {
            stats.archive_rows += 1;
        }
    }
    for (rowid, _) in txn.select(h.live_table(), &keys)? {
        if txn.delete(h.live_table(), rowid)? {
            stats.live_rows += 1;
        }
    }
    Ok(stats)
}

fn key_filter(h: &TableHandle, conds: &[Row]) -> Result<Filter> {
    if conds.is_empty() {
        return Err(VersionError::validation("purge needs at least one key condition").into());
    }
    Ok(Filter::all().any_of(resolve_conds(h, conds)?))
}

impl Registry {
    /// Purge every key matched by `conds` from `table` and its archive.
    pub fn delete(&self, store: &dyn Storage, table: &str, conds: &[Row]) -> Result<PurgeStats> {
        let h = self.handle_for(table)?;
        // validate before opening a transaction
        key_filter(&h, conds)?;
        let mut txn = store.begin()?;
        let stats = match purge_in(txn.as_mut(), &h, conds) {
            Ok(s) => s,
            Err(e) => {
                let _ = txn.rollback();
                return Err(e);
            }
        };
        txn.commit()
            .with_context(|| format!("commit purge of {}", h.live_table()))?;
        record_purge(stats.archive_rows + stats.live_rows);
        info!(
            "purged {}: {} archive row(s), {} live row(s)",
            h.live_table(),
            stats.archive_rows,
            stats.live_rows
        );
        Ok(stats)
    }
}
