//! registry - which tables are versioned and how.
//!
//! A Registry is an ordinary value (no process-global switch): create it, register
//! live/archive pairs, pass it by reference to sessions and queries, shut it down.
//!
//! Registration introspects both tables once through the storage collaborator,
//! validates the pair and caches the descriptors in a TableHandle. It is atomic:
//! on any error nothing is recorded. Registering the same spec again returns the
//! cached handle.

use anyhow::{anyhow, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::clock::{Clock, SystemClock};
use crate::config::{RegistryBuilder, VersionConfig};
use crate::consts::VERSION_COLUMN;
use crate::error::VersionError;
use crate::row::{Row, VersionKey};
use crate::schema::{validate, TableSchema};
use crate::store::{Filter, SchemaSource, Transaction};

/// What to version: a live table, its archive table and the version key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub live_table: String,
    pub archive_table: String,
    pub version_key: Vec<String>,
    /// Columns left out of snapshots and of the dirty check.
    #[serde(default)]
    pub ignored: Vec<String>,
}

impl TableSpec {
    pub fn new(live_table: &str, archive_table: &str, version_key: &[&str]) -> Self {
        Self {
            live_table: live_table.to_string(),
            archive_table: archive_table.to_string(),
            version_key: version_key.iter().map(|s| s.to_string()).collect(),
            ignored: Vec::new(),
        }
    }

    pub fn ignore(mut self, cols: &[&str]) -> Self {
        self.ignored.extend(cols.iter().map(|s| s.to_string()));
        self
    }
}

/// Capability trait for record types that opt into versioning.
pub trait Versioned {
    /// Live table descriptor.
    fn schema() -> TableSchema;

    fn version_key_columns() -> &'static [&'static str];

    /// Archive descriptor; by default derived from the live schema as `<live>_archive`.
    fn archive_schema(actor_column: &str) -> TableSchema {
        let live = Self::schema();
        let name = format!("{}_archive", live.name);
        TableSchema::archive_for(&live, &name, Self::version_key_columns(), actor_column)
    }

    fn ignored_columns() -> &'static [&'static str] {
        &[]
    }

    /// Row image of this record for the live table.
    fn to_snapshot(&self) -> Row;
}

#[derive(Debug)]
pub struct TableInfo {
    spec: TableSpec,
    live: TableSchema,
    archive: TableSchema,
    ignored: Vec<String>,
    log_ref_column: String,
    actor_column: String,
    default_fields: Vec<String>,
}

/// Cached descriptors of one registered pair. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TableHandle(Arc<TableInfo>);

impl TableHandle {
    fn new(spec: TableSpec, live: TableSchema, archive: TableSchema, cfg: &VersionConfig) -> Self {
        let mut ignored = spec.ignored.clone();
        if !ignored.contains(&cfg.log_ref_column) {
            ignored.push(cfg.log_ref_column.clone());
        }
        let default_fields = live
            .column_names()
            .filter(|c| {
                let pk_only = live.primary_key.iter().any(|p| p == c)
                    && !spec.version_key.iter().any(|k| k == c);
                !pk_only && !ignored.iter().any(|i| i == c)
            })
            .map(|c| c.to_string())
            .collect();
        Self(Arc::new(TableInfo {
            spec,
            live,
            archive,
            ignored,
            log_ref_column: cfg.log_ref_column.clone(),
            actor_column: cfg.actor_column.clone(),
            default_fields,
        }))
    }

    pub fn spec(&self) -> &TableSpec {
        &self.0.spec
    }

    pub fn live_table(&self) -> &str {
        &self.0.spec.live_table
    }

    pub fn archive_table(&self) -> &str {
        &self.0.spec.archive_table
    }

    pub fn version_key(&self) -> &[String] {
        &self.0.spec.version_key
    }

    pub fn live_schema(&self) -> &TableSchema {
        &self.0.live
    }

    pub fn archive_schema(&self) -> &TableSchema {
        &self.0.archive
    }

    /// Ignored columns, `log_ref` included.
    pub fn ignored(&self) -> &[String] {
        &self.0.ignored
    }

    pub fn is_ignored(&self, col: &str) -> bool {
        self.0.ignored.iter().any(|c| c == col)
    }

    pub fn log_ref_column(&self) -> &str {
        &self.0.log_ref_column
    }

    pub fn actor_column(&self) -> &str {
        &self.0.actor_column
    }

    /// Projection used by queries when the caller names no fields.
    pub fn default_fields(&self) -> &[String] {
        &self.0.default_fields
    }

    pub fn key_of(&self, row: &Row) -> Result<VersionKey> {
        VersionKey::from_row(row, self.version_key())
    }

    /// Greatest archived version of `key`, as seen by `txn`.
    pub fn latest_version(&self, txn: &dyn Transaction, key: &VersionKey) -> Result<Option<u64>> {
        crate::version::latest_version(txn, self, key)
    }

    /// Version of the archive entry the live row of `key` points at.
    /// None if the key has no live row or the row was never archived.
    pub fn current_version(&self, txn: &dyn Transaction, key: &VersionKey) -> Result<Option<u64>> {
        let live = txn.select(self.live_table(), &Filter::all().key(key))?;
        let Some((_, row)) = live.into_iter().next() else {
            return Ok(None);
        };
        let Some(log_ref) = row.value(self.log_ref_column()).as_i64() else {
            return Ok(None);
        };
        let entry = txn.get(self.archive_table(), log_ref as u64)?;
        Ok(entry
            .and_then(|e| e.value(VERSION_COLUMN).as_i64())
            .map(|v| v as u64))
    }
}

pub struct Registry {
    cfg: VersionConfig,
    clock: Arc<dyn Clock>,
    tables: RwLock<HashMap<String, TableHandle>>,
    closed: AtomicBool,
}

impl Registry {
    pub fn create(cfg: VersionConfig) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn with_clock(cfg: VersionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            tables: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &VersionConfig {
        &self.cfg
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(anyhow!("registry is shut down"));
        }
        Ok(())
    }

    /// Enable versioning for `spec.live_table`.
    pub fn register_table(&self, source: &dyn SchemaSource, spec: TableSpec) -> Result<TableHandle> {
        self.ensure_open()?;
        if let Some(h) = self.handle(&spec.live_table) {
            if h.spec() == &spec {
                debug!("register_table: {} already registered", spec.live_table);
                return Ok(h);
            }
            return Err(VersionError::validation(format!(
                "table '{}' is already registered with a different spec",
                spec.live_table
            ))
            .into());
        }

        let live = source.table_schema(&spec.live_table)?;
        let archive = source.table_schema(&spec.archive_table)?;
        validate(&live, &archive, &spec.version_key, &self.cfg)?;
        for col in &spec.ignored {
            if !live.has_column(col) {
                return Err(VersionError::validation(format!(
                    "ignored column '{}' is not on table '{}'",
                    col, live.name
                ))
                .into());
            }
            if spec.version_key.contains(col) {
                return Err(VersionError::validation(format!(
                    "version key column '{}' cannot be ignored",
                    col
                ))
                .into());
            }
        }

        let handle = TableHandle::new(spec, live, archive, &self.cfg);
        let mut tables = self
            .tables
            .write()
            .map_err(|_| anyhow!("registry lock poisoned"))?;
        // lost a registration race: keep the first one if it is the same spec
        if let Some(h) = tables.get(handle.live_table()) {
            if h.spec() == handle.spec() {
                return Ok(h.clone());
            }
            return Err(VersionError::validation(format!(
                "table '{}' is already registered with a different spec",
                handle.live_table()
            ))
            .into());
        }
        tables.insert(handle.live_table().to_string(), handle.clone());
        info!(
            "versioning enabled: {} -> {} key=({})",
            handle.live_table(),
            handle.archive_table(),
            handle.version_key().join(", ")
        );
        Ok(handle)
    }

    /// Register a `Versioned` record type. Both tables must already exist in `source`.
    pub fn register_entity<T: Versioned>(&self, source: &dyn SchemaSource) -> Result<TableHandle> {
        let live = T::schema();
        let archive = T::archive_schema(&self.cfg.actor_column);
        let spec = TableSpec::new(&live.name, &archive.name, T::version_key_columns())
            .ignore(T::ignored_columns());
        self.register_table(source, spec)
    }

    pub fn handle(&self, live_table: &str) -> Option<TableHandle> {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.get(live_table).cloned())
    }

    /// Handle of a registered table or a ValidationError naming it.
    pub fn handle_for(&self, live_table: &str) -> Result<TableHandle> {
        self.ensure_open()?;
        self.handle(live_table).ok_or_else(|| {
            VersionError::validation(format!("table '{}' is not versioned", live_table)).into()
        })
    }

    pub fn tables(&self) -> Vec<TableHandle> {
        let mut out: Vec<TableHandle> = self
            .tables
            .read()
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| a.live_table().cmp(b.live_table()));
        out
    }

    /// Drop every registration; later calls fail.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut t) = self.tables.write() {
            t.clear();
        }
        info!("registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
