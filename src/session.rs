//! session - explicit unit of work over versioned tables.
//!
//! A Session owns one storage transaction. Live mutations are applied to it
//! immediately (so later reads in the same session see them) and recorded as
//! ChangeRecords. `commit` hands the change set to the interceptor, which writes
//! the archive entries in the same transaction, then commits storage. Any error
//! rolls the whole unit back: neither the live change nor an archive row survives.
//!
//! A ConflictError from commit means a concurrent writer took the same
//! (key, version); retry the whole unit of work.

use anyhow::{anyhow, Result};
use log::debug;

use crate::error::VersionError;
use crate::registry::{Registry, TableHandle, Versioned};
use crate::row::{Row, VersionKey};
use crate::store::{Filter, Storage, Transaction};
use crate::value::Value;
use crate::version::{before_commit, ChangeRecord};

pub struct Session<'a> {
    registry: &'a Registry,
    txn: Option<Box<dyn Transaction + 'a>>,
    changes: Vec<ChangeRecord>,
    actor: Option<String>,
}

impl<'a> Session<'a> {
    pub fn begin(registry: &'a Registry, store: &'a dyn Storage) -> Result<Self> {
        Ok(Self {
            registry,
            txn: Some(store.begin()?),
            changes: Vec::new(),
            actor: None,
        })
    }

    /// Stamp `actor` on every archive entry this unit of work writes.
    pub fn updated_by(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn set_actor(&mut self, actor: Option<&str>) {
        self.actor = actor.map(|s| s.to_string());
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Read access to the underlying transaction (own writes visible).
    pub fn txn(&self) -> Result<&(dyn Transaction + 'a)> {
        self.txn
            .as_deref()
            .ok_or_else(|| anyhow!("session already finished"))
    }

    fn txn_mut(&mut self) -> Result<&mut (dyn Transaction + 'a)> {
        self.txn
            .as_deref_mut()
            .ok_or_else(|| anyhow!("session already finished"))
    }

    pub fn pending_changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    /// Live row of `key`, if any.
    pub fn find(&self, table: &str, key: &VersionKey) -> Result<Option<(u64, Row)>> {
        let handle = self.registry.handle_for(table)?;
        let rows = self
            .txn()?
            .select(handle.live_table(), &Filter::all().key(key))?;
        Ok(rows.into_iter().next())
    }

    /// Version of the archive entry the live row of `key` currently points at.
    pub fn current_version(&self, table: &str, key: &VersionKey) -> Result<Option<u64>> {
        let handle = self.registry.handle_for(table)?;
        handle.current_version(self.txn()?, key)
    }

    pub fn insert(&mut self, table: &str, mut row: Row) -> Result<u64> {
        let handle = self.registry.handle_for(table)?;
        reject_log_ref(&handle, &row)?;
        handle.key_of(&row)?;
        let log_ref = handle.log_ref_column().to_string();
        let nullable = handle
            .live_schema()
            .get_column(&log_ref)
            .map(|c| c.nullable)
            .unwrap_or(true);
        row.set(&log_ref, if nullable { Value::Null } else { Value::Int(0) });

        let txn = self.txn_mut()?;
        let rowid = txn.insert(table, row)?;
        let after = txn
            .get(table, rowid)?
            .ok_or_else(|| anyhow!("insert {}: row {} not readable back", table, rowid))?;
        debug!("session insert {} row {}", table, rowid);
        self.changes.push(ChangeRecord::insert(table, rowid, after));
        Ok(rowid)
    }

    /// Insert a `Versioned` record into its live table.
    pub fn insert_entity<T: Versioned>(&mut self, rec: &T) -> Result<u64> {
        let table = T::schema().name;
        self.insert(&table, rec.to_snapshot())
    }

    /// Apply `changes` to the live row of `key`. Returns false if there is no such row.
    /// Changing key columns moves the record to a new key.
    pub fn update(&mut self, table: &str, key: &VersionKey, changes: Row) -> Result<bool> {
        let handle = self.registry.handle_for(table)?;
        reject_log_ref(&handle, &changes)?;
        let Some((rowid, before)) = self.find(table, key)? else {
            return Ok(false);
        };
        let after = before.merged(&changes);
        handle.key_of(&after)?;
        self.txn_mut()?.update(table, rowid, after.clone())?;
        debug!("session update {} row {} ({})", table, rowid, key);
        self.changes
            .push(ChangeRecord::update(table, rowid, before, after));
        Ok(true)
    }

    /// Remove the live row of `key`; the archive keeps its history plus a tombstone.
    pub fn delete(&mut self, table: &str, key: &VersionKey) -> Result<bool> {
        let Some((rowid, before)) = self.find(table, key)? else {
            return Ok(false);
        };
        self.txn_mut()?.delete(table, rowid)?;
        debug!("session delete {} row {} ({})", table, rowid, key);
        self.changes.push(ChangeRecord::delete(table, rowid, before));
        Ok(true)
    }

    /// Write archive entries and commit. Returns the new log_ids in write order.
    pub fn commit(mut self) -> Result<Vec<u64>> {
        let mut txn = self
            .txn
            .take()
            .ok_or_else(|| anyhow!("session already finished"))?;
        let changes = std::mem::take(&mut self.changes);
        match before_commit(self.registry, txn.as_mut(), &changes, self.actor.as_deref()) {
            Ok(ids) => {
                txn.commit()?;
                debug!("session commit: {} change(s), {} archive entr(ies)", changes.len(), ids.len());
                Ok(ids)
            }
            Err(e) => {
                let _ = txn.rollback();
                Err(e)
            }
        }
    }

    pub fn rollback(mut self) -> Result<()> {
        match self.txn.take() {
            Some(txn) => txn.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            let _ = txn.rollback();
        }
    }
}

fn reject_log_ref(handle: &TableHandle, row: &Row) -> Result<()> {
    if row.contains(handle.log_ref_column()) {
        return Err(VersionError::validation(format!(
            "'{}' is maintained by the versioning core and cannot be written",
            handle.log_ref_column()
        ))
        .into());
    }
    Ok(())
}

impl Registry {
    /// Start a unit of work against `store`.
    pub fn session<'a>(&'a self, store: &'a dyn Storage) -> Result<Session<'a>> {
        Session::begin(self, store)
    }
}
