use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::util::{open, parse_assignments, parse_key};

pub fn exec(
    path: PathBuf,
    table: String,
    key: String,
    set: Vec<String>,
    actor: Option<String>,
    at: Option<String>,
) -> Result<()> {
    let opened = open(&path, at.as_deref())?;
    let h = opened.registry.handle_for(&table)?;
    let key = parse_key(&h, &key)?;
    let changes = parse_assignments(&h, &set)?;

    let mut s = opened.registry.session(&opened.store)?;
    s.set_actor(actor.as_deref());
    if !s.update(&table, &key, changes)? {
        return Err(anyhow!("{}: no live row for {}", table, key));
    }
    let ids = s.commit()?;

    if ids.is_empty() {
        println!("OK: {} unchanged (no versioned column differs)", key);
    } else {
        let ids: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        println!("OK: updated {} in {}, log_id(s) {}", key, table, ids.join(", "));
    }
    Ok(())
}
