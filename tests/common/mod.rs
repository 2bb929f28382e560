//! Shared fixtures for integration tests.
//!
//! - `Fixture`: MemStore + Registry with a pinned ManualClock and the
//!   `products` / `products_archive` pair registered (version key `product_id`).
//! - `multi_key_fixture`: same for a two-column key (`product_id_1`, `product_id_2`).
//! - `unique_root`: fresh temp dir for journal-backed stores.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use chrono::{DateTime, Utc};

use VersionDB::{
    ColumnType, ManualClock, MemStore, Registry, Row, Storage, TableHandle, TableSchema, TableSpec,
    Value, VersionConfig, VersionKey,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("vdbtest-{prefix}-{pid}-{t}-{id}"))
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).expect("valid unix seconds")
}

pub fn products_schema() -> TableSchema {
    TableSchema::new("products")
        .column("id", ColumnType::Int)
        .column("product_id", ColumnType::Int)
        .nullable_column("col1", ColumnType::Text)
        .nullable_column("col2", ColumnType::Int)
        .nullable_column("col3", ColumnType::Int)
        .nullable_column("log_ref", ColumnType::Int)
        .primary_key(&["id"])
        .unique(&["product_id"])
}

pub fn products_archive() -> TableSchema {
    TableSchema::archive_for(&products_schema(), "products_archive", &["product_id"], "actor")
}

pub fn p1() -> Row {
    Row::new()
        .with("product_id", 10)
        .with("col1", "foobar")
        .with("col2", 10)
        .with("col3", 1)
}

pub fn p2() -> Row {
    Row::new()
        .with("product_id", 11)
        .with("col1", "baz")
        .with("col2", 11)
        .with("col3", 1)
}

pub fn p3() -> Row {
    Row::new()
        .with("product_id", 2546)
        .with("col1", "test")
        .with("col2", 12)
        .with("col3", 0)
}

pub fn pid(n: i64) -> VersionKey {
    VersionKey::new(vec![("product_id".to_string(), Value::Int(n))])
}

pub fn cond(n: i64) -> Row {
    Row::new().with("product_id", n)
}

pub struct Fixture {
    pub store: MemStore,
    pub registry: Registry,
    pub clock: Arc<ManualClock>,
    pub handle: TableHandle,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Self::with_spec(TableSpec::new("products", "products_archive", &["product_id"]))
    }

    pub fn with_spec(spec: TableSpec) -> Result<Self> {
        let store = MemStore::new();
        store.create_table(products_schema())?;
        store.create_table(products_archive())?;
        Self::on_store(store, spec)
    }

    pub fn on_store(store: MemStore, spec: TableSpec) -> Result<Self> {
        let clock = Arc::new(ManualClock::at_unix(0));
        let registry = Registry::builder()
            .config(VersionConfig::default())
            .clock(clock.clone())
            .build();
        let handle = registry.register_table(&store, spec)?;
        Ok(Self {
            store,
            registry,
            clock,
            handle,
        })
    }

    pub fn at(&self, secs: i64) {
        self.clock.set_unix(secs);
    }

    pub fn insert(&self, row: Row) -> Result<u64> {
        let mut s = self.registry.session(&self.store)?;
        s.insert("products", row)?;
        let ids = s.commit()?;
        Ok(ids[0])
    }

    pub fn update(&self, key: i64, changes: Row) -> Result<Vec<u64>> {
        let mut s = self.registry.session(&self.store)?;
        assert!(s.update("products", &pid(key), changes)?);
        s.commit()
    }

    pub fn delete(&self, key: i64) -> Result<Vec<u64>> {
        let mut s = self.registry.session(&self.store)?;
        assert!(s.delete("products", &pid(key))?);
        s.commit()
    }

    /// All archive rows of `key`, ascending version.
    pub fn archive_of(&self, key: i64) -> Result<Vec<Row>> {
        let tx = self.store.begin()?;
        let mut rows: Vec<Row> = tx
            .select("products_archive", &VersionDB::Filter::all().eq("product_id", key))?
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        tx.rollback()?;
        rows.sort_by_key(|r| r.value("version").as_i64());
        Ok(rows)
    }

    pub fn live_of(&self, key: i64) -> Result<Option<Row>> {
        let tx = self.store.begin()?;
        let row = tx
            .select("products", &VersionDB::Filter::all().eq("product_id", key))?
            .into_iter()
            .next()
            .map(|(_, r)| r);
        tx.rollback()?;
        Ok(row)
    }

    pub fn archive_len(&self) -> Result<usize> {
        let tx = self.store.begin()?;
        let n = tx.select("products_archive", &VersionDB::Filter::all())?.len();
        tx.rollback()?;
        Ok(n)
    }

    pub fn current_version(&self, key: i64) -> Result<Option<u64>> {
        let tx = self.store.begin()?;
        let v = self.handle.current_version(tx.as_ref(), &pid(key))?;
        tx.rollback()?;
        Ok(v)
    }
}

pub fn multi_key_fixture() -> Result<(MemStore, Registry, TableHandle)> {
    let live = TableSchema::new("multi")
        .column("id", ColumnType::Int)
        .column("product_id_1", ColumnType::Int)
        .column("product_id_2", ColumnType::Text)
        .nullable_column("col1", ColumnType::Text)
        .nullable_column("col2", ColumnType::Int)
        .nullable_column("log_ref", ColumnType::Int)
        .primary_key(&["id"])
        .unique(&["product_id_1", "product_id_2"]);
    let archive = TableSchema::archive_for(
        &live,
        "multi_archive",
        &["product_id_1", "product_id_2"],
        "actor",
    );
    let store = MemStore::new();
    store.create_table(live)?;
    store.create_table(archive)?;
    let registry = Registry::create(VersionConfig::default());
    let handle = registry.register_table(
        &store,
        TableSpec::new("multi", "multi_archive", &["product_id_1", "product_id_2"]),
    )?;
    Ok((store, registry, handle))
}

pub fn mkey(a: i64, b: &str) -> VersionKey {
    VersionKey::new(vec![
        ("product_id_1".to_string(), Value::Int(a)),
        ("product_id_2".to_string(), Value::from(b)),
    ])
}
