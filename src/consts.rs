//! Общие константы: имена служебных колонок, дефолты пагинации, формат журнала.

// -------- Archive bookkeeping columns --------
pub const LOG_ID_COLUMN: &str = "log_id";
pub const VERSION_COLUMN: &str = "version";
pub const DELETED_COLUMN: &str = "deleted";
pub const UPDATED_AT_COLUMN: &str = "updated_at";
pub const DATA_COLUMN: &str = "data";

// Overridable via VersionConfig (VDB_ACTOR_COLUMN / VDB_LOG_REF_COLUMN)
pub const DEFAULT_ACTOR_COLUMN: &str = "actor";
pub const DEFAULT_LOG_REF_COLUMN: &str = "log_ref";

// -------- Query pagination --------
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 10_000;

// -------- Journal (MemStore durability) --------
// File header: [magic8][ver u32][reserved u32]
// Record:      [seq u64][len u32][crc32 u32] + payload(len, JSON)
pub const JOURNAL_FILE: &str = "journal-000001.log";
pub const JOURNAL_MAGIC: &[u8; 8] = b"VDBJRN01";
pub const JOURNAL_VERSION: u32 = 1;
pub const JOURNAL_HDR_SIZE: usize = 16;
pub const JOURNAL_REC_HDR_SIZE: usize = 16;

pub const JOURNAL_REC_OFF_SEQ: usize = 0;
pub const JOURNAL_REC_OFF_LEN: usize = 8;
pub const JOURNAL_REC_OFF_CRC32: usize = 12;

// -------- Root layout --------
pub const LOCK_FILE: &str = "LOCK";
pub const TABLES_FILE: &str = "tables.json";
