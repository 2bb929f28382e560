//! query - time-travel reads over the archive log.
//!
//! - mod.rs   - GetOptions, HistoryRecord, the get pipeline
//! - conds.rs - key condition validation
//! - slice.rs - row selection per mode (cursor / latest / as-of / range)
//! - dedup.rs - dedup-by-projection
//!
//! Pipeline: validate -> storage select (include_deleted filter, order, page) -> dedup.
//! Pagination is applied to the archive rows before dedup, so a page may hold
//! fewer than page_size records.

pub mod conds;
pub mod dedup;
pub mod slice;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::consts::{
    DATA_COLUMN, DELETED_COLUMN, LOG_ID_COLUMN, UPDATED_AT_COLUMN, VERSION_COLUMN,
};
use crate::error::VersionError;
use crate::metrics::record_query;
use crate::payload::{decode, PayloadKind};
use crate::registry::{Registry, TableHandle};
use crate::row::{Row, VersionKey};
use crate::store::{Filter, Page, Storage, Transaction};
use crate::value::Value;

pub use conds::resolve_conds;
pub use dedup::Dedup;

#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Cursor: only entries with log_id > va_id, ascending log_id. Time options are ignored.
    pub va_id: Option<u64>,
    pub t1: Option<DateTime<Utc>>,
    pub t2: Option<DateTime<Utc>>,
    /// Projection; None = every live column except the storage primary key and log_ref.
    pub fields: Option<Vec<String>>,
    /// OR of per-key equality maps; empty = every key.
    pub conds: Vec<Row>,
    pub include_deleted: bool,
    /// 1-indexed.
    pub page: usize,
    /// None = VersionConfig::page_size.
    pub page_size: Option<usize>,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            va_id: None,
            t1: None,
            t2: None,
            fields: None,
            conds: Vec::new(),
            include_deleted: true,
            page: 1,
            page_size: None,
        }
    }
}

impl GetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since_log_id(mut self, va_id: u64) -> Self {
        self.va_id = Some(va_id);
        self
    }

    /// As-of slice at `t`.
    pub fn at(mut self, t: DateTime<Utc>) -> Self {
        self.t1 = Some(t);
        self.t2 = None;
        self
    }

    /// Changes with updated_at in [t1, t2).
    pub fn between(mut self, t1: DateTime<Utc>, t2: DateTime<Utc>) -> Self {
        self.t1 = Some(t1);
        self.t2 = Some(t2);
        self
    }

    /// Changes with updated_at in [epoch, t2).
    pub fn until(mut self, t2: DateTime<Utc>) -> Self {
        self.t1 = None;
        self.t2 = Some(t2);
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn cond(mut self, cond: Row) -> Self {
        self.conds.push(cond);
        self
    }

    pub fn include_deleted(mut self, on: bool) -> Self {
        self.include_deleted = on;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.page_size = Some(n);
        self
    }
}

/// One reconstructed state of one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub log_id: u64,
    pub version_key: VersionKey,
    pub version: u64,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
    pub actor: Option<String>,
    pub data: Map<String, Json>,
}

/// Decoded archive row.
#[derive(Debug, Clone)]
pub struct ArchiveRow {
    pub log_id: u64,
    pub key: VersionKey,
    pub version: u64,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
    pub actor: Option<String>,
    pub payload: Json,
}

impl ArchiveRow {
    pub fn parse(h: &TableHandle, row: &Row) -> Result<Self> {
        let bad = |col: &str| {
            VersionError::encoding(format!(
                "archive '{}' row has a malformed '{}' ({})",
                h.archive_table(),
                col,
                row.value(col)
            ))
        };
        let log_id = row
            .value(LOG_ID_COLUMN)
            .as_i64()
            .filter(|n| *n >= 0)
            .ok_or_else(|| bad(LOG_ID_COLUMN))? as u64;
        let version = row
            .value(VERSION_COLUMN)
            .as_i64()
            .filter(|n| *n >= 0)
            .ok_or_else(|| bad(VERSION_COLUMN))? as u64;
        let deleted = row
            .value(DELETED_COLUMN)
            .as_bool()
            .ok_or_else(|| bad(DELETED_COLUMN))?;
        let updated_at = row
            .value(UPDATED_AT_COLUMN)
            .as_timestamp()
            .ok_or_else(|| bad(UPDATED_AT_COLUMN))?;
        let payload = match row.value(DATA_COLUMN) {
            Value::Json(j) => {
                if !j.is_object() {
                    return Err(bad(DATA_COLUMN).into());
                }
                j
            }
            Value::Text(s) => decode(s.as_bytes(), PayloadKind::Object)?,
            _ => return Err(bad(DATA_COLUMN).into()),
        };
        let actor = row.value(h.actor_column()).as_str().map(|s| s.to_string());
        Ok(Self {
            log_id,
            key: h.key_of(row)?,
            version,
            deleted,
            updated_at,
            actor,
            payload,
        })
    }
}

fn check_paging(page: usize, page_size: usize, max_page_size: usize) -> Result<usize> {
    if page < 1 {
        return Err(VersionError::validation(format!("page must be >= 1, got {}", page)).into());
    }
    if page_size < 1 {
        return Err(
            VersionError::validation(format!("page_size must be >= 1, got {}", page_size)).into(),
        );
    }
    if page_size > max_page_size {
        return Err(VersionError::validation(format!(
            "page_size {} exceeds the maximum {}",
            page_size, max_page_size
        ))
        .into());
    }
    (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| VersionError::validation("page offset overflows").into())
}

/// Run a history query inside an existing transaction.
pub fn get_in(
    txn: &dyn Transaction,
    registry: &Registry,
    h: &TableHandle,
    opts: &GetOptions,
) -> Result<Vec<HistoryRecord>> {
    let page_size = opts.page_size.unwrap_or(registry.config().page_size);
    let offset = check_paging(opts.page, page_size, registry.config().max_page_size)?;
    let conds = resolve_conds(h, &opts.conds)?;
    let keys = if conds.is_empty() {
        Filter::all()
    } else {
        Filter::all().any_of(conds)
    };

    let live = if opts.include_deleted {
        Filter::all()
    } else {
        Filter::all().eq(DELETED_COLUMN, false)
    };
    let window = Page::new().offset(offset).limit(page_size);

    let rows = match (opts.va_id, opts.t1, opts.t2) {
        (Some(after), _, _) => slice::cursor(txn, h, after, &keys, &live, &window)?,
        (None, None, None) => slice::latest(txn, h, &keys, &live, &window)?,
        (None, Some(t), None) => slice::as_of(txn, h, t, &keys, &live, &window)?,
        (None, t1, Some(t2)) => {
            slice::range(txn, h, t1.unwrap_or_default(), t2, &keys, &live, &window)?
        }
    };

    let fields: Vec<String> = match &opts.fields {
        Some(f) => f.clone(),
        None => h.default_fields().to_vec(),
    };
    let mut dedup = Dedup::new(&fields);
    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        if let Some(rec) = dedup.push(ArchiveRow::parse(h, r)?) {
            out.push(rec);
        }
    }

    record_query(out.len(), dedup.dropped());
    debug!(
        "get {}: {} record(s), {} collapsed, page {} x {}",
        h.live_table(),
        out.len(),
        dedup.dropped(),
        opts.page,
        page_size
    );
    Ok(out)
}

impl Registry {
    /// History query against `table` in a read-only transaction.
    pub fn get(&self, store: &dyn Storage, table: &str, opts: &GetOptions) -> Result<Vec<HistoryRecord>> {
        let h = self.handle_for(table)?;
        let txn = store.begin()?;
        let res = get_in(txn.as_ref(), self, &h, opts);
        txn.rollback()?;
        res
    }
}
