//! query/slice - archive row selection for each query mode.
//!
//! cursor: log_id > N and below the commit horizon, ascending log_id
//! latest: entries referenced by a live row's log_ref
//! as_of:  per key the greatest version with updated_at <= t
//!         (anti-join: no other row of the key with a greater version and updated_at <= t)
//! range:  updated_at in [t1, t2)
//!
//! Every mode hands ordering and the page window to storage; `live` carries the
//! include_deleted filter.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::consts::{LOG_ID_COLUMN, UPDATED_AT_COLUMN, VERSION_COLUMN};
use crate::registry::TableHandle;
use crate::row::Row;
use crate::store::{Filter, Page, Transaction};
use crate::value::Value;

/// Order by version key columns, then version. Offset/limit come from `window`.
fn key_order(h: &TableHandle, window: &Page) -> Page {
    let mut p = h
        .version_key()
        .iter()
        .fold(Page::new(), |p, c| p.asc(c))
        .asc(VERSION_COLUMN);
    p.offset = window.offset;
    p.limit = window.limit;
    p
}

fn rows_only(rows: Vec<(u64, Row)>) -> Vec<Row> {
    rows.into_iter().map(|(_, r)| r).collect()
}

/// Entries committed after `after`. Stops below the lowest log_id still held by
/// an open transaction, so a reader never skips past an entry that commits later.
pub fn cursor(
    txn: &dyn Transaction,
    h: &TableHandle,
    after: u64,
    keys: &Filter,
    live: &Filter,
    window: &Page,
) -> Result<Vec<Row>> {
    let mut f = merge(keys, live).gt(LOG_ID_COLUMN, after);
    if let Some(horizon) = txn.commit_horizon(h.archive_table())? {
        f = f.lt(LOG_ID_COLUMN, horizon);
    }
    let mut page = Page::new().asc(LOG_ID_COLUMN);
    page.offset = window.offset;
    page.limit = window.limit;
    Ok(rows_only(txn.select_page(h.archive_table(), &f, &page)?))
}

pub fn latest(
    txn: &dyn Transaction,
    h: &TableHandle,
    keys: &Filter,
    live: &Filter,
    window: &Page,
) -> Result<Vec<Row>> {
    let refs: Vec<Vec<(String, Value)>> = txn
        .select(h.live_table(), keys)?
        .into_iter()
        .filter_map(|(_, r)| r.value(h.log_ref_column()).as_i64())
        .map(|id| vec![(LOG_ID_COLUMN.to_string(), Value::Int(id))])
        .collect();
    if refs.is_empty() {
        return Ok(Vec::new());
    }
    let f = merge(keys, live).any_of(refs);
    Ok(rows_only(txn.select_page(h.archive_table(), &f, &key_order(h, window))?))
}

/// Deletion is judged on the chosen version only: a key whose newest state at
/// `t` is a tombstone drops out instead of falling back to an older version.
pub fn as_of(
    txn: &dyn Transaction,
    h: &TableHandle,
    t: DateTime<Utc>,
    keys: &Filter,
    live: &Filter,
    window: &Page,
) -> Result<Vec<Row>> {
    let f = keys.clone().le(UPDATED_AT_COLUMN, t);
    Ok(rows_only(txn.select_greatest_per_group(
        h.archive_table(),
        &f,
        h.version_key(),
        VERSION_COLUMN,
        live,
        &key_order(h, window),
    )?))
}

pub fn range(
    txn: &dyn Transaction,
    h: &TableHandle,
    t1: DateTime<Utc>,
    t2: DateTime<Utc>,
    keys: &Filter,
    live: &Filter,
    window: &Page,
) -> Result<Vec<Row>> {
    let f = merge(keys, live)
        .ge(UPDATED_AT_COLUMN, t1)
        .lt(UPDATED_AT_COLUMN, t2);
    Ok(rows_only(txn.select_page(h.archive_table(), &f, &key_order(h, window))?))
}

fn merge(a: &Filter, b: &Filter) -> Filter {
    b.preds().iter().cloned().fold(a.clone(), Filter::and)
}
