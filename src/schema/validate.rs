//! Structural checks for a live/archive table pair.
//!
//! A pair is accepted only if every check passes; the first violation is
//! reported as `VersionError::Schema` naming the rule. Nothing is cached here,
//! the caller (Registry) commits the handle only after `validate` returns Ok.

use anyhow::Result;

use crate::config::VersionConfig;
use crate::consts::{
    DATA_COLUMN, DELETED_COLUMN, LOG_ID_COLUMN, UPDATED_AT_COLUMN, VERSION_COLUMN,
};
use crate::error::{SchemaRule, VersionError};
use crate::value::ColumnType;

use super::TableSchema;

pub fn validate(
    live: &TableSchema,
    archive: &TableSchema,
    version_key: &[String],
    cfg: &VersionConfig,
) -> Result<()> {
    check_key_shape(live, version_key)?;
    check_key_columns(live, archive, version_key)?;
    check_actor_column(archive, version_key, &cfg.actor_column)?;
    check_archive_bookkeeping(archive)?;
    check_archive_unique(archive, version_key)?;
    check_live_unique(live, version_key)?;
    check_log_ref(live, version_key, &cfg.log_ref_column)?;
    Ok(())
}

fn check_key_shape(live: &TableSchema, version_key: &[String]) -> Result<()> {
    if version_key.is_empty() {
        return Err(VersionError::schema(
            &live.name,
            SchemaRule::EmptyVersionKey,
            "at least one version key column is required",
        )
        .into());
    }
    for (i, c) in version_key.iter().enumerate() {
        if version_key[..i].contains(c) {
            return Err(VersionError::schema(
                &live.name,
                SchemaRule::DuplicateKeyColumn,
                format!("version key column '{}' listed twice", c),
            )
            .into());
        }
    }
    Ok(())
}

// Rule 1: every key column on both tables, same primitive type.
fn check_key_columns(live: &TableSchema, archive: &TableSchema, version_key: &[String]) -> Result<()> {
    for c in version_key {
        let lc = live.get_column(c).ok_or_else(|| {
            VersionError::schema(
                &live.name,
                SchemaRule::MissingKeyColumn,
                format!("live table needs column '{}'", c),
            )
        })?;
        let ac = archive.get_column(c).ok_or_else(|| {
            VersionError::schema(
                &archive.name,
                SchemaRule::MissingKeyColumn,
                format!("archive table needs column '{}'", c),
            )
        })?;
        if lc.ty != ac.ty {
            return Err(VersionError::schema(
                &archive.name,
                SchemaRule::KeyTypeMismatch,
                format!(
                    "type of column '{}' must match in live ({}) and archive ({}) tables",
                    c, lc.ty, ac.ty
                ),
            )
            .into());
        }
    }
    Ok(())
}

// Rule 2: nullable text actor column, not part of the key.
fn check_actor_column(archive: &TableSchema, version_key: &[String], actor: &str) -> Result<()> {
    let col = archive.get_column(actor).ok_or_else(|| {
        VersionError::schema(
            &archive.name,
            SchemaRule::MissingActorColumn,
            format!("archive table needs '{}' column", actor),
        )
    })?;
    if version_key.iter().any(|k| k == actor) {
        return Err(VersionError::schema(
            &archive.name,
            SchemaRule::InvalidActorColumn,
            format!("'{}' cannot be a version key column", actor),
        )
        .into());
    }
    if !col.nullable || col.ty != ColumnType::Text {
        return Err(VersionError::schema(
            &archive.name,
            SchemaRule::InvalidActorColumn,
            format!("'{}' must be a nullable text column", actor),
        )
        .into());
    }
    Ok(())
}

fn check_archive_bookkeeping(archive: &TableSchema) -> Result<()> {
    let required: [(&str, &[ColumnType]); 5] = [
        (LOG_ID_COLUMN, &[ColumnType::Int]),
        (VERSION_COLUMN, &[ColumnType::Int]),
        (DELETED_COLUMN, &[ColumnType::Bool]),
        (UPDATED_AT_COLUMN, &[ColumnType::Timestamp]),
        (DATA_COLUMN, &[ColumnType::Json, ColumnType::Text]),
    ];
    for (name, types) in required {
        match archive.get_column(name) {
            Some(c) if types.contains(&c.ty) => {}
            Some(c) => {
                return Err(VersionError::schema(
                    &archive.name,
                    SchemaRule::MissingArchiveColumn,
                    format!("archive column '{}' has type {}", name, c.ty),
                )
                .into())
            }
            None => {
                return Err(VersionError::schema(
                    &archive.name,
                    SchemaRule::MissingArchiveColumn,
                    format!("archive table needs '{}' column", name),
                )
                .into())
            }
        }
    }
    if archive.auto_increment_column() != Some(LOG_ID_COLUMN) {
        return Err(VersionError::schema(
            &archive.name,
            SchemaRule::MissingArchiveColumn,
            format!("'{}' must be the single-column integer primary key", LOG_ID_COLUMN),
        )
        .into());
    }
    Ok(())
}

// Rule 3: unique(key ∪ {version}) on the archive.
fn check_archive_unique(archive: &TableSchema, version_key: &[String]) -> Result<()> {
    let mut cols: Vec<&str> = version_key.iter().map(|s| s.as_str()).collect();
    cols.push(VERSION_COLUMN);
    if !archive.has_unique_exactly(&cols) {
        return Err(VersionError::schema(
            &archive.name,
            SchemaRule::ArchiveUniqueMissing,
            format!("no unique constraint on ({})", cols.join(", ")),
        )
        .into());
    }
    Ok(())
}

// Rule 4: unique(key) or primary key(key) on the live table.
fn check_live_unique(live: &TableSchema, version_key: &[String]) -> Result<()> {
    let cols: Vec<&str> = version_key.iter().map(|s| s.as_str()).collect();
    if !live.has_unique_exactly(&cols) {
        return Err(VersionError::schema(
            &live.name,
            SchemaRule::LiveUniqueMissing,
            format!("no unique constraint on ({})", cols.join(", ")),
        )
        .into());
    }
    Ok(())
}

fn check_log_ref(live: &TableSchema, version_key: &[String], log_ref: &str) -> Result<()> {
    match live.get_column(log_ref) {
        Some(c) if c.ty == ColumnType::Int && !version_key.iter().any(|k| k == log_ref) => Ok(()),
        _ => Err(VersionError::schema(
            &live.name,
            SchemaRule::MissingLogRef,
            format!("live table needs an integer '{}' column outside the version key", log_ref),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::schema_rule;

    fn cfg() -> VersionConfig {
        VersionConfig::default()
    }

    fn key() -> Vec<String> {
        vec!["product_id".to_string()]
    }

    fn live() -> TableSchema {
        TableSchema::new("products")
            .column("id", ColumnType::Int)
            .column("product_id", ColumnType::Int)
            .nullable_column("col1", ColumnType::Text)
            .nullable_column("col2", ColumnType::Int)
            .nullable_column("log_ref", ColumnType::Int)
            .primary_key(&["id"])
            .unique(&["product_id"])
    }

    fn archive() -> TableSchema {
        TableSchema::archive_for(&live(), "products_archive", &["product_id"], "actor")
    }

    fn rule_of(live: &TableSchema, archive: &TableSchema, key: &[String]) -> Option<SchemaRule> {
        let err = validate(live, archive, key, &cfg()).unwrap_err();
        schema_rule(&err)
    }

    #[test]
    fn well_formed_pair_passes() {
        validate(&live(), &archive(), &key(), &cfg()).unwrap();
    }

    #[test]
    fn version_key_may_be_the_live_primary_key() {
        let live = TableSchema::new("p")
            .column("sku", ColumnType::Text)
            .nullable_column("log_ref", ColumnType::Int)
            .primary_key(&["sku"]);
        let archive = TableSchema::archive_for(&live, "p_archive", &["sku"], "actor");
        validate(&live, &archive, &["sku".to_string()], &cfg()).unwrap();
    }

    #[test]
    fn missing_key_column_on_archive() {
        let a = TableSchema::new("products_archive")
            .column("log_id", ColumnType::Int)
            .nullable_column("actor", ColumnType::Text)
            .primary_key(&["log_id"]);
        assert_eq!(rule_of(&live(), &a, &key()), Some(SchemaRule::MissingKeyColumn));
    }

    #[test]
    fn key_type_mismatch() {
        let mut a = archive();
        for c in a.columns.iter_mut() {
            if c.name == "product_id" {
                c.ty = ColumnType::Text;
            }
        }
        assert_eq!(rule_of(&live(), &a, &key()), Some(SchemaRule::KeyTypeMismatch));
    }

    #[test]
    fn missing_actor_column() {
        let mut a = archive();
        a.columns.retain(|c| c.name != "actor");
        assert_eq!(rule_of(&live(), &a, &key()), Some(SchemaRule::MissingActorColumn));
    }

    #[test]
    fn non_nullable_actor_column() {
        let mut a = archive();
        for c in a.columns.iter_mut() {
            if c.name == "actor" {
                c.nullable = false;
            }
        }
        assert_eq!(rule_of(&live(), &a, &key()), Some(SchemaRule::InvalidActorColumn));
    }

    #[test]
    fn archive_without_key_version_unique() {
        let mut a = archive();
        a.unique.clear();
        assert_eq!(rule_of(&live(), &a, &key()), Some(SchemaRule::ArchiveUniqueMissing));
    }

    #[test]
    fn live_without_key_unique() {
        let mut l = live();
        l.unique.clear();
        assert_eq!(rule_of(&l, &archive(), &key()), Some(SchemaRule::LiveUniqueMissing));
    }

    #[test]
    fn live_without_log_ref() {
        let mut l = live();
        l.columns.retain(|c| c.name != "log_ref");
        assert_eq!(rule_of(&l, &archive(), &key()), Some(SchemaRule::MissingLogRef));
    }

    #[test]
    fn empty_and_duplicate_keys() {
        assert_eq!(rule_of(&live(), &archive(), &[]), Some(SchemaRule::EmptyVersionKey));
        let dup = vec!["product_id".to_string(), "product_id".to_string()];
        assert_eq!(rule_of(&live(), &archive(), &dup), Some(SchemaRule::DuplicateKeyColumn));
    }

    #[test]
    fn archive_bookkeeping_required() {
        let mut a = archive();
        a.columns.retain(|c| c.name != "updated_at");
        assert_eq!(rule_of(&live(), &a, &key()), Some(SchemaRule::MissingArchiveColumn));
    }
}
