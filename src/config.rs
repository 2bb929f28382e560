//! Centralized configuration and builder for VersionDB.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - VersionConfig::from_env() reads VDB_* variables on top of the defaults.
//! - RegistryBuilder collects a config plus a clock and produces a Registry.
//!
//! Defaults:
//! - page_size = 100 (query page size when the caller does not pass one)
//! - max_page_size = 10000 (larger page_size values fail validation)
//! - actor_column = "actor", log_ref_column = "log_ref"
//! - journal_fsync = true (fsync the journal on every commit of a durable MemStore)

use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::consts::{
    DEFAULT_ACTOR_COLUMN, DEFAULT_LOG_REF_COLUMN, DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE,
};
use crate::registry::Registry;

/// Top-level configuration for the versioning registry and the reference store.
#[derive(Clone, Debug)]
pub struct VersionConfig {
    /// Default page size for history queries.
    /// Env: VDB_PAGE_SIZE (default 100)
    pub page_size: usize,

    /// Upper bound accepted for a caller-supplied page size.
    /// Env: VDB_MAX_PAGE_SIZE (default 10000)
    pub max_page_size: usize,

    /// Name of the nullable "who made the change" column on archive tables.
    /// Env: VDB_ACTOR_COLUMN (default "actor")
    pub actor_column: String,

    /// Name of the live-table column holding the current archive log_id.
    /// Env: VDB_LOG_REF_COLUMN (default "log_ref")
    pub log_ref_column: String,

    /// fsync the journal after each committed transaction (durable MemStore only).
    /// Env: VDB_JOURNAL_FSYNC (default true; "0|false|off|no" => false)
    pub journal_fsync: bool,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            actor_column: DEFAULT_ACTOR_COLUMN.to_string(),
            log_ref_column: DEFAULT_LOG_REF_COLUMN.to_string(),
            journal_fsync: true,
        }
    }
}

impl VersionConfig {
    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("VDB_PAGE_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.page_size = n;
                }
            }
        }

        if let Ok(v) = std::env::var("VDB_MAX_PAGE_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.max_page_size = n;
                }
            }
        }

        if let Ok(v) = std::env::var("VDB_ACTOR_COLUMN") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.actor_column = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("VDB_LOG_REF_COLUMN") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.log_ref_column = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("VDB_JOURNAL_FSYNC") {
            let s = v.trim().to_ascii_lowercase();
            cfg.journal_fsync = !(s == "0" || s == "false" || s == "off" || s == "no");
        }

        cfg
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n;
        self
    }

    pub fn with_max_page_size(mut self, n: usize) -> Self {
        self.max_page_size = n;
        self
    }

    pub fn with_actor_column<S: Into<String>>(mut self, name: S) -> Self {
        self.actor_column = name.into();
        self
    }

    pub fn with_log_ref_column<S: Into<String>>(mut self, name: S) -> Self {
        self.log_ref_column = name.into();
        self
    }

    pub fn with_journal_fsync(mut self, on: bool) -> Self {
        self.journal_fsync = on;
        self
    }
}

impl fmt::Display for VersionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VersionConfig {{ \
             page_size: {}, \
             max_page_size: {}, \
             actor_column: {}, \
             log_ref_column: {}, \
             journal_fsync: {} \
             }}",
            self.page_size,
            self.max_page_size,
            self.actor_column,
            self.log_ref_column,
            self.journal_fsync,
        )
    }
}

/// Builder that produces a Registry. `Registry::builder()` returns one.
#[derive(Clone)]
pub struct RegistryBuilder {
    cfg: VersionConfig,
    clock: Arc<dyn Clock>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: VersionConfig::from_env(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: VersionConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, cfg: VersionConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.cfg.page_size = n;
        self
    }

    pub fn max_page_size(mut self, n: usize) -> Self {
        self.cfg.max_page_size = n;
        self
    }

    pub fn actor_column<S: Into<String>>(mut self, name: S) -> Self {
        self.cfg.actor_column = name.into();
        self
    }

    pub fn log_ref_column<S: Into<String>>(mut self, name: S) -> Self {
        self.cfg.log_ref_column = name.into();
        self
    }

    /// Clock used to stamp `updated_at` on archive entries.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Registry {
        Registry::with_clock(self.cfg, self.clock)
    }
}
