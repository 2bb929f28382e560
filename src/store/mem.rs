//! store/mem - MemStore, the reference storage engine.
//!
//! - Tables: rows keyed by rowid (= auto-increment primary key when the table has one).
//! - Transactions read a snapshot taken at `begin` (Arc per table, copy-on-write at commit)
//!   plus their own overlay of writes.
//! - Unique constraints (primary key + unique sets) are checked eagerly against the
//!   visible state and again at commit against rows committed since the snapshot.
//!   First committer wins; the loser gets `VersionError::Conflict`.
//! - Rowids come from a per-table counter at insert time, so they can commit out of
//!   order. Ids handed out to still-open transactions are tracked; the smallest one
//!   at `begin` is the transaction's commit horizon for that table.
//! - Optional durability: every commit is one journal record, written before the
//!   in-memory state changes. `open(root)` replays the journal under an exclusive LOCK.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::VersionConfig;
use crate::error::VersionError;
use crate::metrics::record_conflict;
use crate::row::Row;
use crate::schema::TableSchema;
use crate::value::Value;

use super::journal::{Journal, JournalOp, RowWrite};
use super::lock::{try_acquire_exclusive_lock, LockGuard};
use super::{greatest_per_group, Filter, Page, SchemaSource, Storage, Transaction};

#[derive(Debug, Clone)]
struct TableData {
    schema: TableSchema,
    rows: BTreeMap<u64, Row>,
    // commit seq of the last write per rowid (kept after delete)
    row_ver: BTreeMap<u64, u64>,
}

impl TableData {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            row_ver: BTreeMap::new(),
        }
    }
}

struct Inner {
    tables: BTreeMap<String, Arc<TableData>>,
    next_rowid: HashMap<String, u64>,
    // counter-allocated rowids of transactions not yet finished
    in_flight: HashMap<String, BTreeSet<u64>>,
    commit_seq: u64,
    journal: Option<Journal>,
}

impl Inner {
    fn apply(&mut self, writes: &[RowWrite]) {
        let seq = self.commit_seq + 1;
        for w in writes {
            let Some(td) = self.tables.get_mut(&w.table) else {
                continue;
            };
            let td = Arc::make_mut(td);
            match &w.row {
                Some(r) => {
                    td.rows.insert(w.rowid, r.clone());
                }
                None => {
                    td.rows.remove(&w.rowid);
                }
            }
            td.row_ver.insert(w.rowid, seq);
            let next = self.next_rowid.entry(w.table.clone()).or_insert(1);
            if *next <= w.rowid {
                *next = w.rowid + 1;
            }
        }
        self.commit_seq = seq;
    }

    fn horizons(&self) -> HashMap<String, u64> {
        self.in_flight
            .iter()
            .filter_map(|(t, ids)| ids.iter().next().map(|id| (t.clone(), *id)))
            .collect()
    }

    fn release(&mut self, claimed: &BTreeMap<String, Vec<u64>>) {
        for (t, ids) in claimed {
            if let Some(set) = self.in_flight.get_mut(t) {
                for id in ids {
                    set.remove(id);
                }
                if set.is_empty() {
                    self.in_flight.remove(t);
                }
            }
        }
    }
}

pub struct MemStore {
    inner: Mutex<Inner>,
    root: Option<PathBuf>,
    _lock: Option<LockGuard>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Volatile store: nothing survives the process.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tables: BTreeMap::new(),
                next_rowid: HashMap::new(),
                in_flight: HashMap::new(),
                commit_seq: 0,
                journal: None,
            }),
            root: None,
            _lock: None,
        }
    }

    /// Durable store rooted at `root`: takes the LOCK, replays the journal.
    pub fn open(root: &Path, cfg: &VersionConfig) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create store root {}", root.display()))?;
        let lock = try_acquire_exclusive_lock(root)?;
        let (journal, ops) = Journal::open(root, cfg.journal_fsync)?;

        let mut inner = Inner {
            tables: BTreeMap::new(),
            next_rowid: HashMap::new(),
            in_flight: HashMap::new(),
            commit_seq: 0,
            journal: None,
        };
        let mut commits = 0usize;
        for op in ops {
            match op {
                JournalOp::CreateTable { schema } => {
                    inner
                        .tables
                        .insert(schema.name.clone(), Arc::new(TableData::new(schema)));
                }
                JournalOp::Commit { writes } => {
                    inner.apply(&writes);
                    commits += 1;
                }
            }
        }
        inner.journal = Some(journal);
        info!(
            "MemStore opened at {}: {} table(s), {} commit(s) replayed",
            root.display(),
            inner.tables.len(),
            commits
        );

        Ok(Self {
            inner: Mutex::new(inner),
            root: Some(root.to_path_buf()),
            _lock: Some(lock),
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("MemStore state mutex poisoned"))
    }

    /// Create a table. Fails if a table with the same name exists.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        check_table_def(&schema)?;
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        if inner.tables.contains_key(&schema.name) {
            return Err(anyhow!("table '{}' already exists", schema.name));
        }
        if let Some(j) = inner.journal.as_mut() {
            j.append(&JournalOp::CreateTable {
                schema: schema.clone(),
            })?;
        }
        debug!("create_table: {} ({} columns)", schema.name, schema.columns.len());
        inner
            .tables
            .insert(schema.name.clone(), Arc::new(TableData::new(schema)));
        Ok(())
    }

    /// Create the table unless an identical one exists. Returns true if created.
    pub fn ensure_table(&self, schema: TableSchema) -> Result<bool> {
        {
            let inner = self.lock()?;
            if let Some(td) = inner.tables.get(&schema.name) {
                if td.schema == schema {
                    return Ok(false);
                }
                return Err(anyhow!(
                    "table '{}' exists with a different definition",
                    schema.name
                ));
            }
        }
        self.create_table(schema)?;
        Ok(true)
    }

    /// (table, committed row count) for every table.
    pub fn stats(&self) -> Result<Vec<(String, usize)>> {
        let inner = self.lock()?;
        Ok(inner
            .tables
            .iter()
            .map(|(n, td)| (n.clone(), td.rows.len()))
            .collect())
    }

    /// Counter-allocated ids stay in flight until the allocating transaction ends.
    fn alloc_rowid(&self, table: &str, explicit: Option<u64>) -> Result<u64> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let next = inner.next_rowid.entry(table.to_string()).or_insert(1);
        let id = match explicit {
            Some(id) => id,
            None => *next,
        };
        if *next <= id {
            *next = id + 1;
        }
        if explicit.is_none() {
            inner.in_flight.entry(table.to_string()).or_default().insert(id);
        }
        Ok(id)
    }
}

fn check_table_def(schema: &TableSchema) -> Result<()> {
    if schema.name.is_empty() {
        return Err(VersionError::validation("table name must not be empty").into());
    }
    if schema.columns.is_empty() {
        return Err(VersionError::validation(format!("table '{}' has no columns", schema.name)).into());
    }
    for (i, c) in schema.columns.iter().enumerate() {
        if schema.columns[..i].iter().any(|o| o.name == c.name) {
            return Err(VersionError::validation(format!(
                "table '{}' declares column '{}' twice",
                schema.name, c.name
            ))
            .into());
        }
    }
    for set in schema.unique_sets() {
        for col in set {
            if !schema.has_column(col) {
                return Err(VersionError::validation(format!(
                    "table '{}': constraint names unknown column '{}'",
                    schema.name, col
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn conflict(table: &str, detail: String) -> anyhow::Error {
    record_conflict();
    warn!("conflict on {}: {}", table, detail);
    VersionError::conflict(table, detail).into()
}

fn unique_values<'r>(row: &'r Row, set: &[String]) -> Option<Vec<&'r Value>> {
    let mut out = Vec::with_capacity(set.len());
    for c in set {
        match row.get(c) {
            Some(v) if !v.is_null() => out.push(v),
            // NULL never collides
            _ => return None,
        }
    }
    Some(out)
}

fn same_unique(row: &Row, set: &[String], vals: &[&Value]) -> bool {
    set.iter()
        .zip(vals.iter())
        .all(|(c, v)| row.get(c).map(|rv| rv == *v).unwrap_or(false))
}

impl SchemaSource for MemStore {
    fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let inner = self.lock()?;
        inner
            .tables
            .get(table)
            .map(|td| td.schema.clone())
            .ok_or_else(|| anyhow!("no such table '{}'", table))
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner.tables.keys().cloned().collect())
    }
}

impl Storage for MemStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        let inner = self.lock()?;
        Ok(Box::new(MemTxn {
            store: self,
            snap: inner.tables.clone(),
            horizon: inner.horizons(),
            writes: BTreeMap::new(),
            claimed: BTreeMap::new(),
        }))
    }
}

pub struct MemTxn<'a> {
    store: &'a MemStore,
    snap: BTreeMap<String, Arc<TableData>>,
    horizon: HashMap<String, u64>,
    writes: BTreeMap<String, BTreeMap<u64, Option<Row>>>,
    // rowids this transaction took from the counter
    claimed: BTreeMap<String, Vec<u64>>,
}

impl Drop for MemTxn<'_> {
    fn drop(&mut self) {
        if self.claimed.is_empty() {
            return;
        }
        if let Ok(mut inner) = self.store.inner.lock() {
            inner.release(&self.claimed);
        }
    }
}

impl<'a> MemTxn<'a> {
    fn table(&self, name: &str) -> Result<&TableData> {
        self.snap
            .get(name)
            .map(|a| a.as_ref())
            .ok_or_else(|| anyhow!("no such table '{}'", name))
    }

    fn visible(&self, table: &str, rowid: u64) -> Option<&Row> {
        if let Some(w) = self.writes.get(table).and_then(|ws| ws.get(&rowid)) {
            return w.as_ref();
        }
        self.snap.get(table).and_then(|td| td.rows.get(&rowid))
    }

    fn visible_rows(&self, table: &str) -> Result<Vec<(u64, &Row)>> {
        let td = self.table(table)?;
        let mut out: BTreeMap<u64, &Row> = td.rows.iter().map(|(id, r)| (*id, r)).collect();
        if let Some(ws) = self.writes.get(table) {
            for (id, w) in ws {
                match w {
                    Some(r) => {
                        out.insert(*id, r);
                    }
                    None => {
                        out.remove(id);
                    }
                }
            }
        }
        Ok(out.into_iter().collect())
    }

    fn check_unique(&self, table: &str, rowid: u64, row: &Row) -> Result<()> {
        let schema = &self.table(table)?.schema;
        let visible = self.visible_rows(table)?;
        for set in schema.unique_sets() {
            let Some(vals) = unique_values(row, set) else {
                continue;
            };
            if visible
                .iter()
                .any(|(id, r)| *id != rowid && same_unique(r, set, &vals))
            {
                return Err(conflict(
                    table,
                    format!("duplicate value for unique ({})", set.join(", ")),
                ));
            }
        }
        Ok(())
    }

    fn alloc(&mut self, table: &str) -> Result<u64> {
        let id = self.store.alloc_rowid(table, None)?;
        self.claimed.entry(table.to_string()).or_default().push(id);
        Ok(id)
    }

    fn matching(&self, table: &str, filter: &Filter) -> Result<Vec<(u64, &Row)>> {
        Ok(self
            .visible_rows(table)?
            .into_iter()
            .filter(|(_, r)| filter.matches(r))
            .collect())
    }

    fn put(&mut self, table: &str, rowid: u64, row: Option<Row>) {
        self.writes
            .entry(table.to_string())
            .or_default()
            .insert(rowid, row);
    }
}

impl<'a> Transaction for MemTxn<'a> {
    fn insert(&mut self, table: &str, mut row: Row) -> Result<u64> {
        let schema = self.table(table)?.schema.clone();
        let rowid = match schema.auto_increment_column() {
            Some(pk) => match row.get(pk) {
                Some(Value::Int(n)) if *n >= 0 => self.store.alloc_rowid(table, Some(*n as u64))?,
                Some(v) if !v.is_null() => {
                    return Err(VersionError::validation(format!(
                        "primary key '{}.{}' must be a non-negative integer, got {}",
                        table, pk, v
                    ))
                    .into())
                }
                _ => {
                    let id = self.alloc(table)?;
                    row.set(pk, Value::Int(id as i64));
                    id
                }
            },
            None => self.alloc(table)?,
        };
        schema.check_row(&row)?;
        self.check_unique(table, rowid, &row)?;
        self.put(table, rowid, Some(row));
        Ok(rowid)
    }

    fn update(&mut self, table: &str, rowid: u64, row: Row) -> Result<()> {
        let schema = self.table(table)?.schema.clone();
        if self.visible(table, rowid).is_none() {
            return Err(anyhow!("update {}: row {} not found", table, rowid));
        }
        if let Some(pk) = schema.auto_increment_column() {
            if row.get(pk) != Some(&Value::Int(rowid as i64)) {
                return Err(VersionError::validation(format!(
                    "update {}: primary key '{}' cannot change",
                    table, pk
                ))
                .into());
            }
        }
        schema.check_row(&row)?;
        self.check_unique(table, rowid, &row)?;
        self.put(table, rowid, Some(row));
        Ok(())
    }

    fn delete(&mut self, table: &str, rowid: u64) -> Result<bool> {
        self.table(table)?;
        if self.visible(table, rowid).is_none() {
            return Ok(false);
        }
        self.put(table, rowid, None);
        Ok(true)
    }

    fn get(&self, table: &str, rowid: u64) -> Result<Option<Row>> {
        self.table(table)?;
        Ok(self.visible(table, rowid).cloned())
    }

    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<(u64, Row)>> {
        Ok(self
            .matching(table, filter)?
            .into_iter()
            .map(|(id, r)| (id, r.clone()))
            .collect())
    }

    fn select_page(&self, table: &str, filter: &Filter, page: &Page) -> Result<Vec<(u64, Row)>> {
        Ok(page.apply(self.matching(table, filter)?))
    }

    fn select_greatest_per_group(
        &self,
        table: &str,
        filter: &Filter,
        group_by: &[String],
        by: &str,
        having: &Filter,
        page: &Page,
    ) -> Result<Vec<(u64, Row)>> {
        let picked: Vec<(u64, &Row)> = greatest_per_group(self.matching(table, filter)?, group_by, by)
            .into_iter()
            .filter(|(_, r)| having.matches(r))
            .collect();
        Ok(page.apply(picked))
    }

    fn commit_horizon(&self, table: &str) -> Result<Option<u64>> {
        self.table(table)?;
        Ok(self.horizon.get(table).copied())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.writes.values().all(|ws| ws.is_empty()) {
            return Ok(());
        }
        let mut guard = self.store.lock()?;
        let inner = &mut *guard;

        for (tname, ws) in &self.writes {
            let cur = inner
                .tables
                .get(tname)
                .ok_or_else(|| anyhow!("commit: table '{}' vanished", tname))?;
            let snap = self.table(tname)?;

            for rowid in ws.keys() {
                if snap.row_ver.get(rowid) != cur.row_ver.get(rowid) {
                    return Err(conflict(
                        tname,
                        format!("row {} was changed by a concurrent transaction", rowid),
                    ));
                }
            }

            for (rowid, w) in ws {
                let Some(row) = w else { continue };
                for set in cur.schema.unique_sets() {
                    let Some(vals) = unique_values(row, set) else {
                        continue;
                    };
                    let clash = cur.rows.iter().any(|(id, r)| {
                        id != rowid && !ws.contains_key(id) && same_unique(r, set, &vals)
                    });
                    if clash {
                        return Err(conflict(
                            tname,
                            format!(
                                "unique ({}) taken by a concurrent transaction",
                                set.join(", ")
                            ),
                        ));
                    }
                }
            }
        }

        let writes: Vec<RowWrite> = self
            .writes
            .iter()
            .flat_map(|(t, ws)| {
                ws.iter().map(move |(id, r)| RowWrite {
                    table: t.clone(),
                    rowid: *id,
                    row: r.clone(),
                })
            })
            .collect();

        if let Some(j) = inner.journal.as_mut() {
            j.append(&JournalOp::Commit {
                writes: writes.clone(),
            })
            .context("journal commit")?;
        }
        inner.apply(&writes);
        debug!("commit seq={} ({} row write(s))", inner.commit_seq, writes.len());
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
