//! query/dedup - dedup-by-projection over an ordered stream of archive rows.
//!
//! One lookback: a row is emitted when its key differs from the previous row's
//! key, or when its projected data or deleted flag differs from the last
//! emitted row. Fields missing from a payload project to null.

use serde_json::{Map, Value as Json};

use crate::payload::field;
use crate::row::VersionKey;

use super::{ArchiveRow, HistoryRecord};

pub struct Dedup<'f> {
    fields: &'f [String],
    prev_key: Option<VersionKey>,
    last: Option<(Map<String, Json>, bool)>,
    dropped: usize,
}

impl<'f> Dedup<'f> {
    pub fn new(fields: &'f [String]) -> Self {
        Self {
            fields,
            prev_key: None,
            last: None,
            dropped: 0,
        }
    }

    fn project(&self, payload: &Json) -> Map<String, Json> {
        self.fields
            .iter()
            .map(|f| (f.clone(), field(payload, f)))
            .collect()
    }

    pub fn push(&mut self, row: ArchiveRow) -> Option<HistoryRecord> {
        let data = self.project(&row.payload);
        let same_key = self.prev_key.as_ref() == Some(&row.key);
        let same_state = self
            .last
            .as_ref()
            .map(|(d, del)| *d == data && *del == row.deleted)
            .unwrap_or(false);
        self.prev_key = Some(row.key.clone());
        if same_key && same_state {
            self.dropped += 1;
            return None;
        }
        self.last = Some((data.clone(), row.deleted));
        Some(HistoryRecord {
            log_id: row.log_id,
            version_key: row.key,
            version: row.version,
            deleted: row.deleted,
            updated_at: row.updated_at,
            actor: row.actor,
            data,
        })
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
