//! Exclusive LOCK file for a MemStore journal root.
//!
//! fs2 advisory lock on <root>/LOCK, held for the lifetime of the store and
//! released on Drop. A second process opening the same root fails fast.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("path", &self.path).finish()
    }
}

/// Try to take the exclusive lock. Returns Err if another holder exists.
pub fn try_acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    let path = root.join(LOCK_FILE);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    file.try_lock_exclusive()
        .with_context(|| format!("store root is locked by another process: {}", path.display()))?;
    Ok(LockGuard { file, path })
}
