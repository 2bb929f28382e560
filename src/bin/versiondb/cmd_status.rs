use anyhow::Result;
use std::path::PathBuf;

use VersionDB::metrics;

use crate::util::open;

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let opened = open(&path, None)?;
    let stats = opened.store.stats()?;
    let versioned = opened.registry.tables();
    let ms = metrics::snapshot();

    if json {
        let tables: Vec<serde_json::Value> = stats
            .iter()
            .map(|(name, rows)| serde_json::json!({"name": name, "rows": rows}))
            .collect();
        let versioned: Vec<serde_json::Value> = versioned
            .iter()
            .map(|h| {
                serde_json::json!({
                    "live_table": h.live_table(),
                    "archive_table": h.archive_table(),
                    "version_key": h.version_key(),
                    "ignored": h.ignored(),
                })
            })
            .collect();
        let out = serde_json::json!({
            "path": path.display().to_string(),
            "config": opened.registry.config().to_string(),
            "tables": tables,
            "versioned": versioned,
            "metrics": {
                "journal_replayed_frames": ms.journal_replayed_frames,
                "journal_frames": ms.journal_frames,
                "journal_bytes": ms.journal_bytes,
                "journal_fsync_calls": ms.journal_fsync_calls,
            },
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("VersionDB status at {}", path.display());
    println!("  {}", opened.registry.config());
    println!("Tables:");
    for (name, rows) in &stats {
        println!("  {:<32} {} row(s)", name, rows);
    }
    println!("Versioned:");
    if versioned.is_empty() {
        println!("  (none)");
    }
    for h in &versioned {
        println!(
            "  {} -> {} key=({}){}",
            h.live_table(),
            h.archive_table(),
            h.version_key().join(", "),
            if h.spec().ignored.is_empty() {
                String::new()
            } else {
                format!(" ignored=({})", h.spec().ignored.join(", "))
            }
        );
    }
    println!("Journal:");
    println!("  replayed frames: {}", ms.journal_replayed_frames);
    println!("  appended frames: {} ({} B)", ms.journal_frames, ms.journal_bytes);
    Ok(())
}
