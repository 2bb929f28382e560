//! store/journal - append-only journal for MemStore.
//!
//! Формат:
//! - header: [magic8 "VDBJRN01"][ver u32][reserved u32]
//! - record: [seq u64][len u32][crc32 u32] + payload(len), payload = JSON JournalOp
//! - CRC32 (crc32fast) считается по header[0..crc) + payload.
//!
//! Одна запись = один закоммиченный unit of work (или CREATE TABLE), поэтому
//! реплей применяет транзакции целиком. Неполный или битый хвост - нормальный
//! конец журнала: он обрезается до последней целой записи.
//!
//! Неудачная запись (ENOSPC/EIO) откатывает файл до начала записи, чтобы
//! следующие коммиты не оказались за мусором. Если откат тоже не удался,
//! журнал помечается poisoned и дальнейшие append отклоняются.

use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::consts::{
    JOURNAL_FILE, JOURNAL_HDR_SIZE, JOURNAL_MAGIC, JOURNAL_REC_HDR_SIZE, JOURNAL_REC_OFF_CRC32,
    JOURNAL_REC_OFF_LEN, JOURNAL_REC_OFF_SEQ, JOURNAL_VERSION,
};
use crate::metrics::{record_journal_frame, record_journal_fsync, record_journal_replayed};
use crate::row::Row;
use crate::schema::TableSchema;

/// One row-level effect of a committed transaction. `row == None` is a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowWrite {
    pub table: String,
    pub rowid: u64,
    pub row: Option<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalOp {
    CreateTable { schema: TableSchema },
    Commit { writes: Vec<RowWrite> },
}

pub struct Journal {
    file: File,
    path: PathBuf,
    next_seq: u64,
    fsync: bool,
    poisoned: bool,
}

impl Journal {
    /// Open (or create) `<root>/journal-000001.log` and read back every intact record.
    pub fn open(root: &Path, fsync: bool) -> Result<(Self, Vec<JournalOp>)> {
        let path = root.join(JOURNAL_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("open journal {}", path.display()))?;

        if file.metadata()?.len() < JOURNAL_HDR_SIZE as u64 {
            debug!("journal: fresh header at {}", path.display());
            write_header(&mut file)?;
            file.sync_all()?;
        }

        let mut hdr = [0u8; JOURNAL_HDR_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut hdr)?;
        if &hdr[..8] != JOURNAL_MAGIC {
            return Err(anyhow!("bad journal magic in {}", path.display()));
        }
        let ver = LittleEndian::read_u32(&hdr[8..12]);
        if ver != JOURNAL_VERSION {
            return Err(anyhow!(
                "unsupported journal version {} in {} (expected {})",
                ver,
                path.display(),
                JOURNAL_VERSION
            ));
        }

        let (ops, good_end, last_seq) = read_records(&mut file, &path)?;
        let len = file.metadata()?.len();
        if good_end < len {
            warn!(
                "journal: truncating torn tail {} -> {} in {}",
                len,
                good_end,
                path.display()
            );
            file.set_len(good_end)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        if !ops.is_empty() {
            info!("journal replay: {} record(s) from {}", ops.len(), path.display());
            record_journal_replayed(ops.len());
        }

        Ok((
            Self {
                file,
                path,
                next_seq: last_seq + 1,
                fsync,
                poisoned: false,
            },
            ops,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Append one record at the end of the file; fsync when configured.
    /// On any write error the file is cut back to where the record started.
    pub fn append(&mut self, op: &JournalOp) -> Result<()> {
        if self.poisoned {
            return Err(anyhow!(
                "journal {} refuses writes after an unrecoverable write error",
                self.path.display()
            ));
        }
        let payload = serde_json::to_vec(op).context("serialize journal op")?;
        if payload.len() > u32::MAX as usize {
            return Err(anyhow!(
                "journal record too large: {} bytes (max {})",
                payload.len(),
                u32::MAX
            ));
        }
        let hdr = build_rec_hdr(self.next_seq, &payload);

        let start = self.file.seek(SeekFrom::End(0))?;
        if let Err(e) = self.write_record(&hdr, &payload) {
            self.discard_tail(start);
            return Err(e.context(format!("append journal record seq={}", self.next_seq)));
        }
        record_journal_frame(JOURNAL_REC_HDR_SIZE + payload.len());
        self.next_seq += 1;
        Ok(())
    }

    fn write_record(&mut self, hdr: &[u8], payload: &[u8]) -> Result<()> {
        self.file.write_all(hdr)?;
        self.file.write_all(payload)?;
        if self.fsync {
            self.file
                .sync_data()
                .with_context(|| format!("fsync journal {}", self.path.display()))?;
            record_journal_fsync();
        }
        Ok(())
    }

    // Cut a partially written record so later appends follow the last intact one.
    fn discard_tail(&mut self, start: u64) {
        let res = self
            .file
            .set_len(start)
            .and_then(|_| self.file.seek(SeekFrom::Start(start)).map(|_| ()));
        match res {
            Ok(()) => warn!(
                "journal: failed append rolled back to off={} in {}",
                start,
                self.path.display()
            ),
            Err(e) => {
                self.poisoned = true;
                error!(
                    "journal: cannot roll back failed append in {} ({}), journal poisoned",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

fn write_header(f: &mut File) -> Result<()> {
    let mut hdr = [0u8; JOURNAL_HDR_SIZE];
    hdr[..8].copy_from_slice(JOURNAL_MAGIC);
    LittleEndian::write_u32(&mut hdr[8..12], JOURNAL_VERSION);
    LittleEndian::write_u32(&mut hdr[12..16], 0);
    f.set_len(0)?;
    f.seek(SeekFrom::Start(0))?;
    f.write_all(&hdr)?;
    Ok(())
}

fn build_rec_hdr(seq: u64, payload: &[u8]) -> [u8; JOURNAL_REC_HDR_SIZE] {
    let mut hdr = [0u8; JOURNAL_REC_HDR_SIZE];
    LittleEndian::write_u64(&mut hdr[JOURNAL_REC_OFF_SEQ..JOURNAL_REC_OFF_SEQ + 8], seq);
    LittleEndian::write_u32(
        &mut hdr[JOURNAL_REC_OFF_LEN..JOURNAL_REC_OFF_LEN + 4],
        payload.len() as u32,
    );
    let mut h = Crc32::new();
    h.update(&hdr[..JOURNAL_REC_OFF_CRC32]);
    h.update(payload);
    let crc = h.finalize();
    LittleEndian::write_u32(&mut hdr[JOURNAL_REC_OFF_CRC32..JOURNAL_REC_OFF_CRC32 + 4], crc);
    hdr
}

/// Returns (ops, end offset of the last intact record, last seq).
fn read_records(f: &mut File, path: &Path) -> Result<(Vec<JournalOp>, u64, u64)> {
    let len = f.metadata()?.len();
    let mut pos = JOURNAL_HDR_SIZE as u64;
    let mut ops = Vec::new();
    let mut last_seq = 0u64;

    while pos + (JOURNAL_REC_HDR_SIZE as u64) <= len {
        f.seek(SeekFrom::Start(pos))?;
        let mut hdr = [0u8; JOURNAL_REC_HDR_SIZE];
        if f.read_exact(&mut hdr).is_err() {
            debug!("journal: partial header tail at off={}, stop", pos);
            break;
        }
        let seq = LittleEndian::read_u64(&hdr[JOURNAL_REC_OFF_SEQ..JOURNAL_REC_OFF_SEQ + 8]);
        let payload_len =
            LittleEndian::read_u32(&hdr[JOURNAL_REC_OFF_LEN..JOURNAL_REC_OFF_LEN + 4]) as usize;
        let crc_expected =
            LittleEndian::read_u32(&hdr[JOURNAL_REC_OFF_CRC32..JOURNAL_REC_OFF_CRC32 + 4]);
        let rec_total = JOURNAL_REC_HDR_SIZE as u64 + payload_len as u64;
        if pos + rec_total > len {
            debug!(
                "journal: partial record tail at off={}, need {} bytes, stop",
                pos, rec_total
            );
            break;
        }

        let mut payload = vec![0u8; payload_len];
        f.read_exact(&mut payload)?;

        let mut h = Crc32::new();
        h.update(&hdr[..JOURNAL_REC_OFF_CRC32]);
        h.update(&payload);
        let crc_actual = h.finalize();
        if crc_actual != crc_expected {
            warn!(
                "journal: CRC mismatch at off={} in {}, expected={}, actual={}, stop",
                pos,
                path.display(),
                crc_expected,
                crc_actual
            );
            break;
        }

        let op: JournalOp = serde_json::from_slice(&payload).with_context(|| {
            format!("decode journal record seq={} at off={} in {}", seq, pos, path.display())
        })?;
        ops.push(op);
        last_seq = seq;
        pos += rec_total;
    }
    Ok((ops, pos, last_seq))
}
