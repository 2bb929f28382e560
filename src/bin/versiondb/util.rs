use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use VersionDB::consts::TABLES_FILE;
use VersionDB::query::HistoryRecord;
use VersionDB::value::parse_timestamp;
use VersionDB::{
    ManualClock, MemStore, Registry, Row, TableHandle, TableSchema, TableSpec, Value,
    VersionConfig, VersionKey,
};

/// tables.json: versioned table registrations of one store root.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TablesFile {
    pub tables: Vec<TableSpec>,
}

/// `create-table` input: live schema plus versioning options.
#[derive(Debug, Deserialize)]
pub struct TableDef {
    #[serde(flatten)]
    pub schema: TableSchema,
    pub version_key: Vec<String>,
    #[serde(default)]
    pub ignored: Vec<String>,
    #[serde(default)]
    pub archive_table: Option<String>,
}

pub struct Opened {
    pub store: MemStore,
    pub registry: Registry,
}

pub fn read_tables(root: &Path) -> Result<TablesFile> {
    let p = root.join(TABLES_FILE);
    if !p.exists() {
        return Ok(TablesFile::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

/// tmp (fsynced) + rename, then fsync the root so the rename itself is durable.
pub fn write_tables(root: &Path, tf: &TablesFile) -> Result<()> {
    let p = root.join(TABLES_FILE);
    let tmp = root.join(format!("{}.tmp", TABLES_FILE));
    let body = serde_json::to_vec_pretty(tf)?;
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;
        f.write_all(&body)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, &p).with_context(|| format!("rename {} -> {}", tmp.display(), p.display()))?;
    fsync_dir(root).with_context(|| format!("fsync dir {}", root.display()))?;
    Ok(())
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}
#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Open the store at `root` and register every table listed in tables.json.
/// `at` pins the write clock.
pub fn open(root: &Path, at: Option<&str>) -> Result<Opened> {
    if !root.join(TABLES_FILE).exists() {
        return Err(anyhow!(
            "{} is not initialized (run `versiondb init --path {}`)",
            root.display(),
            root.display()
        ));
    }
    let cfg = VersionConfig::from_env();
    let store = MemStore::open(root, &cfg)?;
    let mut builder = Registry::builder().config(cfg);
    if let Some(s) = at {
        builder = builder.clock(Arc::new(ManualClock::new(parse_timestamp(s)?)));
    }
    let registry = builder.build();
    for spec in read_tables(root)?.tables {
        registry
            .register_table(&store, spec.clone())
            .with_context(|| format!("register {}", spec.live_table))?;
    }
    Ok(Opened { store, registry })
}

fn split_assignment(s: &str) -> Result<(&str, &str)> {
    s.split_once('=')
        .map(|(c, v)| (c.trim(), v))
        .ok_or_else(|| anyhow!("expected COL=VALUE, got '{}'", s))
}

/// Parse `col=value` assignments using the live column types.
pub fn parse_assignments(h: &TableHandle, items: &[String]) -> Result<Row> {
    let mut row = Row::new();
    for item in items {
        let (col, raw) = split_assignment(item)?;
        let ty = h
            .live_schema()
            .get_column(col)
            .map(|c| c.ty)
            .ok_or_else(|| anyhow!("table '{}' has no column '{}'", h.live_table(), col))?;
        row.set(col, Value::parse_as(raw, ty)?);
    }
    Ok(row)
}

/// "col=value[,col=value]" -> one condition map.
pub fn parse_cond(h: &TableHandle, s: &str) -> Result<Row> {
    let items: Vec<String> = s.split(',').map(|p| p.to_string()).collect();
    parse_assignments(h, &items)
}

pub fn parse_key(h: &TableHandle, s: &str) -> Result<VersionKey> {
    let row = parse_cond(h, s)?;
    h.key_of(&row)
}

pub fn record_to_json(r: &HistoryRecord) -> serde_json::Value {
    serde_json::json!({
        "log_id": r.log_id,
        "key": r.version_key.to_json(),
        "version": r.version,
        "deleted": r.deleted,
        "updated_at": Value::Timestamp(r.updated_at).to_json(),
        "actor": r.actor,
        "data": r.data,
    })
}
