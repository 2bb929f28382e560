use anyhow::Result;
use std::path::PathBuf;

use crate::util::{open, parse_cond};

pub fn exec(path: PathBuf, table: String, conds: Vec<String>) -> Result<()> {
    let opened = open(&path, None)?;
    let h = opened.registry.handle_for(&table)?;
    let conds = conds
        .iter()
        .map(|c| parse_cond(&h, c))
        .collect::<Result<Vec<_>>>()?;

    let stats = opened.registry.delete(&opened.store, &table, &conds)?;
    println!(
        "OK: purged {} archive row(s) and {} live row(s) from {}",
        stats.archive_rows, stats.live_rows, table
    );
    Ok(())
}
