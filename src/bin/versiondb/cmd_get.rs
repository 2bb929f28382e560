use anyhow::Result;
use std::path::PathBuf;

use VersionDB::payload::payload_to_row;
use VersionDB::value::parse_timestamp;
use VersionDB::{ColumnType, GetOptions, Value};

use crate::util::{open, parse_cond, record_to_json};

pub struct GetArgs {
    pub path: PathBuf,
    pub table: String,
    pub since_log_id: Option<u64>,
    pub t1: Option<String>,
    pub t2: Option<String>,
    pub fields: Option<String>,
    pub conds: Vec<String>,
    pub exclude_deleted: bool,
    pub page: usize,
    pub page_size: Option<usize>,
    pub json: bool,
}

pub fn exec(args: GetArgs) -> Result<()> {
    let opened = open(&args.path, None)?;
    let h = opened.registry.handle_for(&args.table)?;

    let mut opts = GetOptions::new()
        .include_deleted(!args.exclude_deleted)
        .page(args.page);
    opts.va_id = args.since_log_id;
    opts.t1 = args.t1.as_deref().map(parse_timestamp).transpose()?;
    opts.t2 = args.t2.as_deref().map(parse_timestamp).transpose()?;
    opts.page_size = args.page_size;
    opts.fields = args.fields.as_deref().map(|f| {
        f.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    });
    for c in &args.conds {
        opts.conds.push(parse_cond(&h, c)?);
    }

    let records = opened.registry.get(&opened.store, &args.table, &opts)?;

    if args.json {
        let arr: Vec<serde_json::Value> = records.iter().map(record_to_json).collect();
        println!("{}", serde_json::to_string_pretty(&arr)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("(no records)");
        return Ok(());
    }
    let live_types: Vec<(String, ColumnType)> = h
        .live_schema()
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.ty))
        .collect();
    for r in &records {
        println!(
            "log_id={} {} v{}{} at {} by {}",
            r.log_id,
            r.version_key,
            r.version,
            if r.deleted { " [deleted]" } else { "" },
            Value::Timestamp(r.updated_at),
            r.actor.as_deref().unwrap_or("-")
        );
        // typed rendering for live columns; other projected fields print as raw JSON
        let cols: Vec<(String, ColumnType)> = live_types
            .iter()
            .filter(|(name, _)| r.data.contains_key(name))
            .cloned()
            .collect();
        let raw = |name: &String, v: &serde_json::Value| format!("{}={}", name, v);
        let parts: Vec<String> =
            match payload_to_row(&serde_json::Value::Object(r.data.clone()), &cols) {
                Ok(typed) => {
                    let mut parts: Vec<String> =
                        typed.iter().map(|(c, v)| format!("{}={}", c, v)).collect();
                    parts.extend(
                        r.data
                            .iter()
                            .filter(|(name, _)| !typed.contains(name))
                            .map(|(name, v)| raw(name, v)),
                    );
                    parts
                }
                // payload written under an older column type
                Err(_) => r.data.iter().map(|(name, v)| raw(name, v)).collect(),
            };
        println!("  {}", parts.join(" "));
    }
    Ok(())
}
