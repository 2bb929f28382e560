use anyhow::Result;
use std::path::PathBuf;

use crate::util::{open, parse_assignments};

pub fn exec(
    path: PathBuf,
    table: String,
    set: Vec<String>,
    actor: Option<String>,
    at: Option<String>,
) -> Result<()> {
    let opened = open(&path, at.as_deref())?;
    let h = opened.registry.handle_for(&table)?;
    let row = parse_assignments(&h, &set)?;

    let mut s = opened.registry.session(&opened.store)?;
    s.set_actor(actor.as_deref());
    let rowid = s.insert(&table, row)?;
    let ids = s.commit()?;

    println!(
        "OK: inserted row {} into {}, log_id {}",
        rowid,
        table,
        ids.last().map(|i| i.to_string()).unwrap_or_else(|| "-".into())
    );
    Ok(())
}
