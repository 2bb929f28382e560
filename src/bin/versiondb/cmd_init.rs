use anyhow::{Context, Result};
use std::path::PathBuf;

use VersionDB::consts::TABLES_FILE;
use VersionDB::{MemStore, VersionConfig};

use crate::util::{write_tables, TablesFile};

pub fn exec(path: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&path).with_context(|| format!("create {}", path.display()))?;
    let cfg = VersionConfig::from_env();
    // creates the journal header and takes the LOCK once
    let _store = MemStore::open(&path, &cfg)?;
    if !path.join(TABLES_FILE).exists() {
        write_tables(&path, &TablesFile::default())?;
    }
    println!("Initialized VersionDB at {}", path.display());
    println!("  {}", cfg);
    Ok(())
}
