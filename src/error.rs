//! Error taxonomy for the versioning core.
//!
//! Everything in the crate returns `anyhow::Result`; the typed failures a caller
//! may want to react to are raised as [`VersionError`] and can be recovered with
//! [`VersionError::of`] (works through `.context(..)` layers).
//!
//! - Schema     - registration-time structural violation (fatal to registration).
//! - Conflict   - uniqueness violation at write/commit time; caller retries the unit of work.
//! - Validation - malformed caller input, raised before any I/O.
//! - Encoding   - payload encode/decode type mismatch.

use std::fmt;

use thiserror::Error;

/// Which structural rule a live/archive table pair violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaRule {
    EmptyVersionKey,
    DuplicateKeyColumn,
    MissingKeyColumn,
    KeyTypeMismatch,
    MissingActorColumn,
    InvalidActorColumn,
    MissingArchiveColumn,
    ArchiveUniqueMissing,
    LiveUniqueMissing,
    MissingLogRef,
}

impl fmt::Display for SchemaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemaRule::EmptyVersionKey => "empty-version-key",
            SchemaRule::DuplicateKeyColumn => "duplicate-key-column",
            SchemaRule::MissingKeyColumn => "missing-key-column",
            SchemaRule::KeyTypeMismatch => "key-type-mismatch",
            SchemaRule::MissingActorColumn => "missing-actor-column",
            SchemaRule::InvalidActorColumn => "invalid-actor-column",
            SchemaRule::MissingArchiveColumn => "missing-archive-column",
            SchemaRule::ArchiveUniqueMissing => "archive-unique-missing",
            SchemaRule::LiveUniqueMissing => "live-unique-missing",
            SchemaRule::MissingLogRef => "missing-log-ref",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("schema error [{rule}] on table '{table}': {detail}")]
    Schema {
        table: String,
        rule: SchemaRule,
        detail: String,
    },

    #[error("conflict on table '{table}': {detail}")]
    Conflict { table: String, detail: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl VersionError {
    pub fn schema(table: &str, rule: SchemaRule, detail: impl Into<String>) -> Self {
        VersionError::Schema {
            table: table.to_string(),
            rule,
            detail: detail.into(),
        }
    }

    pub fn conflict(table: &str, detail: impl Into<String>) -> Self {
        VersionError::Conflict {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        VersionError::Validation(detail.into())
    }

    pub fn encoding(detail: impl Into<String>) -> Self {
        VersionError::Encoding(detail.into())
    }

    /// Find the typed error inside an `anyhow::Error` chain.
    pub fn of(err: &anyhow::Error) -> Option<&VersionError> {
        err.chain().find_map(|e| e.downcast_ref::<VersionError>())
    }

    pub fn schema_rule(&self) -> Option<SchemaRule> {
        match self {
            VersionError::Schema { rule, .. } => Some(*rule),
            _ => None,
        }
    }
}

#[inline]
pub fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(VersionError::of(err), Some(VersionError::Conflict { .. }))
}

#[inline]
pub fn is_validation(err: &anyhow::Error) -> bool {
    matches!(VersionError::of(err), Some(VersionError::Validation(_)))
}

#[inline]
pub fn is_encoding(err: &anyhow::Error) -> bool {
    matches!(VersionError::of(err), Some(VersionError::Encoding(_)))
}

/// Rule of a schema error, if `err` is one.
#[inline]
pub fn schema_rule(err: &anyhow::Error) -> Option<SchemaRule> {
    VersionError::of(err).and_then(|e| e.schema_rule())
}
