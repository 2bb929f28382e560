use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::util::{open, parse_key};

pub fn exec(
    path: PathBuf,
    table: String,
    key: String,
    actor: Option<String>,
    at: Option<String>,
) -> Result<()> {
    let opened = open(&path, at.as_deref())?;
    let h = opened.registry.handle_for(&table)?;
    let key = parse_key(&h, &key)?;

    let mut s = opened.registry.session(&opened.store)?;
    s.set_actor(actor.as_deref());
    if !s.delete(&table, &key)? {
        return Err(anyhow!("{}: no live row for {}", table, key));
    }
    let ids = s.commit()?;
    println!(
        "OK: deleted {} from {}, tombstone log_id {}",
        key,
        table,
        ids.last().map(|i| i.to_string()).unwrap_or_else(|| "-".into())
    );
    Ok(())
}
