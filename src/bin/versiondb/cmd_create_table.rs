use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use VersionDB::{ColumnType, TableSchema, TableSpec};

use crate::util::{open, read_tables, write_tables, TableDef};

pub fn exec(path: PathBuf, spec_file: Option<PathBuf>, spec_json: Option<String>) -> Result<()> {
    let text = match (spec_file, spec_json) {
        (Some(f), _) => std::fs::read_to_string(&f).with_context(|| format!("read {}", f.display()))?,
        (None, Some(s)) => s,
        (None, None) => return Err(anyhow!("provide --spec-file or --spec-json")),
    };
    let def: TableDef = serde_json::from_str(&text).context("parse table definition")?;

    let opened = open(&path, None)?;
    let cfg = opened.registry.config().clone();

    let mut live = def.schema;
    if !live.has_column(&cfg.log_ref_column) {
        live = live.nullable_column(&cfg.log_ref_column, ColumnType::Int);
    }
    let archive_name = def
        .archive_table
        .unwrap_or_else(|| format!("{}_archive", live.name));
    let key: Vec<&str> = def.version_key.iter().map(|s| s.as_str()).collect();
    let archive = TableSchema::archive_for(&live, &archive_name, &key, &cfg.actor_column);

    let ignored: Vec<&str> = def.ignored.iter().map(|s| s.as_str()).collect();
    let spec = TableSpec::new(&live.name, &archive_name, &key).ignore(&ignored);

    let mut tf = read_tables(&path)?;
    if tf.tables.iter().any(|t| t.live_table == spec.live_table) {
        return Err(anyhow!("table '{}' is already versioned", spec.live_table));
    }

    // validate the pair before anything is written
    VersionDB::schema::validate(&live, &archive, &spec.version_key, &cfg)?;

    opened.store.ensure_table(live)?;
    opened.store.ensure_table(archive)?;
    opened.registry.register_table(&opened.store, spec.clone())?;

    tf.tables.push(spec.clone());
    write_tables(&path, &tf)?;

    println!(
        "Created {} (archive {}), version key ({})",
        spec.live_table,
        spec.archive_table,
        spec.version_key.join(", ")
    );
    Ok(())
}
