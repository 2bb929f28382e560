//! Lightweight global metrics for VersionDB.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Archive writer (appends / tombstones / skipped no-op updates)
//! - Conflicts (uniqueness violations at write or commit time)
//! - Query engine (queries, rows returned, rows collapsed by dedup)
//! - Delete API (purges, purged rows)
//! - Journal (MemStore durability)

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Archive writer -----
static ARCHIVE_APPENDS: AtomicU64 = AtomicU64::new(0);
static ARCHIVE_TOMBSTONES: AtomicU64 = AtomicU64::new(0);
static UPDATES_SKIPPED: AtomicU64 = AtomicU64::new(0);

// ----- Conflicts -----
static CONFLICTS: AtomicU64 = AtomicU64::new(0);

// ----- Query engine -----
static QUERIES: AtomicU64 = AtomicU64::new(0);
static QUERY_ROWS_RETURNED: AtomicU64 = AtomicU64::new(0);
static QUERY_ROWS_DEDUPED: AtomicU64 = AtomicU64::new(0);

// ----- Delete API -----
static PURGES: AtomicU64 = AtomicU64::new(0);
static PURGED_ROWS: AtomicU64 = AtomicU64::new(0);

// ----- Journal -----
static JOURNAL_FRAMES: AtomicU64 = AtomicU64::new(0);
static JOURNAL_BYTES: AtomicU64 = AtomicU64::new(0);
static JOURNAL_FSYNC_CALLS: AtomicU64 = AtomicU64::new(0);
static JOURNAL_REPLAYED_FRAMES: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Archive writer
    pub archive_appends: u64,
    pub archive_tombstones: u64,
    pub updates_skipped: u64,

    // Conflicts
    pub conflicts: u64,

    // Query engine
    pub queries: u64,
    pub query_rows_returned: u64,
    pub query_rows_deduped: u64,

    // Delete API
    pub purges: u64,
    pub purged_rows: u64,

    // Journal
    pub journal_frames: u64,
    pub journal_bytes: u64,
    pub journal_fsync_calls: u64,
    pub journal_replayed_frames: u64,
}

impl MetricsSnapshot {
    /// Share of fetched history rows that dedup collapsed.
    pub fn dedup_ratio(&self) -> f64 {
        let total = self.query_rows_returned + self.query_rows_deduped;
        if total == 0 {
            0.0
        } else {
            self.query_rows_deduped as f64 / total as f64
        }
    }

    pub fn avg_journal_frame_bytes(&self) -> f64 {
        if self.journal_frames == 0 {
            0.0
        } else {
            self.journal_bytes as f64 / self.journal_frames as f64
        }
    }
}

// ----- Recorders (Archive writer) -----
pub fn record_archive_append(tombstone: bool) {
    ARCHIVE_APPENDS.fetch_add(1, Ordering::Relaxed);
    if tombstone {
        ARCHIVE_TOMBSTONES.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_update_skipped() {
    UPDATES_SKIPPED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Conflicts) -----
pub fn record_conflict() {
    CONFLICTS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Query engine) -----
pub fn record_query(returned: usize, deduped: usize) {
    QUERIES.fetch_add(1, Ordering::Relaxed);
    QUERY_ROWS_RETURNED.fetch_add(returned as u64, Ordering::Relaxed);
    QUERY_ROWS_DEDUPED.fetch_add(deduped as u64, Ordering::Relaxed);
}

// ----- Recorders (Delete API) -----
pub fn record_purge(rows: usize) {
    PURGES.fetch_add(1, Ordering::Relaxed);
    PURGED_ROWS.fetch_add(rows as u64, Ordering::Relaxed);
}

// ----- Recorders (Journal) -----
pub fn record_journal_frame(bytes: usize) {
    JOURNAL_FRAMES.fetch_add(1, Ordering::Relaxed);
    JOURNAL_BYTES.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub fn record_journal_fsync() {
    JOURNAL_FSYNC_CALLS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_journal_replayed(frames: usize) {
    JOURNAL_REPLAYED_FRAMES.fetch_add(frames as u64, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        archive_appends: ARCHIVE_APPENDS.load(Ordering::Relaxed),
        archive_tombstones: ARCHIVE_TOMBSTONES.load(Ordering::Relaxed),
        updates_skipped: UPDATES_SKIPPED.load(Ordering::Relaxed),

        conflicts: CONFLICTS.load(Ordering::Relaxed),

        queries: QUERIES.load(Ordering::Relaxed),
        query_rows_returned: QUERY_ROWS_RETURNED.load(Ordering::Relaxed),
        query_rows_deduped: QUERY_ROWS_DEDUPED.load(Ordering::Relaxed),

        purges: PURGES.load(Ordering::Relaxed),
        purged_rows: PURGED_ROWS.load(Ordering::Relaxed),

        journal_frames: JOURNAL_FRAMES.load(Ordering::Relaxed),
        journal_bytes: JOURNAL_BYTES.load(Ordering::Relaxed),
        journal_fsync_calls: JOURNAL_FSYNC_CALLS.load(Ordering::Relaxed),
        journal_replayed_frames: JOURNAL_REPLAYED_FRAMES.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    ARCHIVE_APPENDS.store(0, Ordering::Relaxed);
    ARCHIVE_TOMBSTONES.store(0, Ordering::Relaxed);
    UPDATES_SKIPPED.store(0, Ordering::Relaxed);

    CONFLICTS.store(0, Ordering::Relaxed);

    QUERIES.store(0, Ordering::Relaxed);
    QUERY_ROWS_RETURNED.store(0, Ordering::Relaxed);
    QUERY_ROWS_DEDUPED.store(0, Ordering::Relaxed);

    PURGES.store(0, Ordering::Relaxed);
    PURGED_ROWS.store(0, Ordering::Relaxed);

    JOURNAL_FRAMES.store(0, Ordering::Relaxed);
    JOURNAL_BYTES.store(0, Ordering::Relaxed);
    JOURNAL_FSYNC_CALLS.store(0, Ordering::Relaxed);
    JOURNAL_REPLAYED_FRAMES.store(0, Ordering::Relaxed);
}
