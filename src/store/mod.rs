//! store - storage collaborator interfaces and the reference engine.
//!
//! - mod.rs     - SchemaSource / Storage / Transaction traits, Filter predicates, Page
//! - mem.rs     - MemStore: in-memory tables, snapshot transactions, first committer wins
//! - journal.rs - append-only CRC-framed journal (optional durability for MemStore)
//! - lock.rs    - exclusive LOCK file for a journal root
//!
//! The versioning core only talks to these traits. Any transactional store with
//! unique constraints and atomic failure on conflicting writes can stand in.

pub mod journal;
pub mod lock;
pub mod mem;

use anyhow::Result;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::row::Row;
use crate::schema::TableSchema;
use crate::value::Value;

pub use mem::MemStore;

/// Schema introspection.
pub trait SchemaSource {
    fn table_schema(&self, table: &str) -> Result<TableSchema>;
    fn table_names(&self) -> Result<Vec<String>>;
}

/// A transactional store.
pub trait Storage: SchemaSource + Send + Sync {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>>;
}

/// One unit of work against the store.
///
/// Reads see the state as of `begin` plus this transaction's own writes.
/// Unique violations surface as `VersionError::Conflict`, either eagerly on the
/// write or at `commit` if a concurrent transaction got there first.
pub trait Transaction {
    /// Insert a row, returning its generated key (the auto-increment primary
    /// key value when the table has one).
    fn insert(&mut self, table: &str, row: Row) -> Result<u64>;

    /// Replace the full image of an existing row.
    fn update(&mut self, table: &str, rowid: u64, row: Row) -> Result<()>;

    fn delete(&mut self, table: &str, rowid: u64) -> Result<bool>;

    fn get(&self, table: &str, rowid: u64) -> Result<Option<Row>>;

    /// Rows matching `filter`, ascending by rowid.
    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<(u64, Row)>>;

    /// Rows matching `filter`, sorted by `page.order_by` (ties in rowid order),
    /// then cut to `page.offset` / `page.limit`.
    fn select_page(&self, table: &str, filter: &Filter, page: &Page) -> Result<Vec<(u64, Row)>> {
        Ok(page.apply(self.select(table, filter)?))
    }

    /// For every group of equal `group_by` values, the row matching `filter` with
    /// the greatest `by`: no other matching row of the group has a greater `by`.
    /// `having` is applied to the chosen rows only, then `page`.
    fn select_greatest_per_group(
        &self,
        table: &str,
        filter: &Filter,
        group_by: &[String],
        by: &str,
        having: &Filter,
        page: &Page,
    ) -> Result<Vec<(u64, Row)>> {
        let rows = self.select(table, filter)?;
        let picked: Vec<(u64, &Row)> =
            greatest_per_group(rows.iter().map(|(id, r)| (*id, r)), group_by, by)
                .into_iter()
                .filter(|(_, r)| having.matches(r))
                .collect();
        Ok(page.apply(picked))
    }

    /// Rows of `table` at or above this rowid may still appear through
    /// transactions that were in flight at `begin`. None = no such rows.
    fn commit_horizon(&self, _table: &str) -> Result<Option<u64>> {
        Ok(None)
    }

    /// Greatest non-null value of `column` among rows matching `filter`.
    fn max(&self, table: &str, column: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self
            .select(table, filter)?
            .into_iter()
            .filter_map(|(_, r)| r.get(column).filter(|v| !v.is_null()).cloned())
            .max())
    }

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// One predicate. Comparisons against NULL never match.
#[derive(Debug, Clone, PartialEq)]
pub enum Pred {
    Eq(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    Lt(String, Value),
    Le(String, Value),
    /// OR of AND-ed column equalities.
    AnyOf(Vec<Vec<(String, Value)>>),
}

impl Pred {
    pub fn matches(&self, row: &Row) -> bool {
        fn cmp(row: &Row, col: &str, v: &Value, ok: fn(std::cmp::Ordering) -> bool) -> bool {
            match row.get(col) {
                Some(rv) if !rv.is_null() && !v.is_null() => ok(rv.cmp(v)),
                _ => false,
            }
        }
        use std::cmp::Ordering::*;
        match self {
            Pred::Eq(c, v) => cmp(row, c, v, |o| o == Equal),
            Pred::Gt(c, v) => cmp(row, c, v, |o| o == Greater),
            Pred::Ge(c, v) => cmp(row, c, v, |o| o != Less),
            Pred::Lt(c, v) => cmp(row, c, v, |o| o == Less),
            Pred::Le(c, v) => cmp(row, c, v, |o| o != Greater),
            Pred::AnyOf(alts) => alts
                .iter()
                .any(|all| all.iter().all(|(c, v)| cmp(row, c, v, |o| o == Equal))),
        }
    }
}

/// AND of predicates. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    preds: Vec<Pred>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn and(mut self, p: Pred) -> Self {
        self.preds.push(p);
        self
    }

    pub fn eq(self, col: &str, v: impl Into<Value>) -> Self {
        self.and(Pred::Eq(col.to_string(), v.into()))
    }

    pub fn gt(self, col: &str, v: impl Into<Value>) -> Self {
        self.and(Pred::Gt(col.to_string(), v.into()))
    }

    pub fn ge(self, col: &str, v: impl Into<Value>) -> Self {
        self.and(Pred::Ge(col.to_string(), v.into()))
    }

    pub fn lt(self, col: &str, v: impl Into<Value>) -> Self {
        self.and(Pred::Lt(col.to_string(), v.into()))
    }

    pub fn le(self, col: &str, v: impl Into<Value>) -> Self {
        self.and(Pred::Le(col.to_string(), v.into()))
    }

    pub fn any_of(self, alts: Vec<Vec<(String, Value)>>) -> Self {
        self.and(Pred::AnyOf(alts))
    }

    /// Equality on every part of a version key.
    pub fn key(self, key: &crate::row::VersionKey) -> Self {
        key.parts()
            .iter()
            .fold(self, |f, (c, v)| f.and(Pred::Eq(c.clone(), v.clone())))
    }

    pub fn preds(&self) -> &[Pred] {
        &self.preds
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.preds.iter().all(|p| p.matches(row))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub desc: bool,
}

/// Ordering and window of a select. The default keeps rowid order, no cut.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub order_by: Vec<Order>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, col: &str) -> Self {
        self.order_by.push(Order {
            column: col.to_string(),
            desc: false,
        });
        self
    }

    pub fn desc(mut self, col: &str) -> Self {
        self.order_by.push(Order {
            column: col.to_string(),
            desc: true,
        });
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// NULL and missing values sort first.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for o in &self.order_by {
            let ord = a.get(&o.column).cmp(&b.get(&o.column));
            let ord = if o.desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Sort (stable over the incoming rowid order), skip, take; clones only the kept rows.
    pub fn apply<R: Borrow<Row>>(&self, mut rows: Vec<(u64, R)>) -> Vec<(u64, Row)> {
        if !self.order_by.is_empty() {
            rows.sort_by(|(_, a), (_, b)| self.compare(a.borrow(), b.borrow()));
        }
        let take = self.limit.unwrap_or(usize::MAX);
        rows.into_iter()
            .skip(self.offset)
            .take(take)
            .map(|(id, r)| (id, r.borrow().clone()))
            .collect()
    }
}

/// Per group of `group_by` values, the row with the greatest non-null `by`.
/// Groups come back in rowid order of their winners.
pub fn greatest_per_group<'r>(
    rows: impl IntoIterator<Item = (u64, &'r Row)>,
    group_by: &[String],
    by: &str,
) -> Vec<(u64, &'r Row)> {
    let mut best: BTreeMap<Vec<Value>, (u64, &'r Row)> = BTreeMap::new();
    for (id, r) in rows {
        let Some(v) = r.get(by).filter(|v| !v.is_null()) else {
            continue;
        };
        let group: Vec<Value> = group_by.iter().map(|c| r.value(c)).collect();
        match best.get(&group) {
            Some((_, cur)) if cur.get(by).map(|cv| cv >= v).unwrap_or(false) => {}
            _ => {
                best.insert(group, (id, r));
            }
        }
    }
    let mut out: Vec<(u64, &'r Row)> = best.into_values().collect();
    out.sort_by_key(|(id, _)| *id);
    out
}
