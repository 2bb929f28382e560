//! schema - table descriptors built once from storage introspection.
//!
//! - mod.rs      - ColumnDef / TableSchema (columns, primary key, unique constraints)
//! - validate.rs - structural checks for a live/archive pair before versioning is enabled

pub mod validate;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::consts::{
    DATA_COLUMN, DELETED_COLUMN, LOG_ID_COLUMN, UPDATED_AT_COLUMN, VERSION_COLUMN,
};
use crate::error::VersionError;
use crate::row::Row;
use crate::value::ColumnType;

pub use validate::validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Add a NOT NULL column.
    pub fn column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            ty,
            nullable: false,
        });
        self
    }

    pub fn nullable_column(mut self, name: &str, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.to_string(),
            ty,
            nullable: true,
        });
        self
    }

    pub fn primary_key(mut self, cols: &[&str]) -> Self {
        self.primary_key = cols.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn unique(mut self, cols: &[&str]) -> Self {
        self.unique.push(cols.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[inline]
    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Primary key (if any) followed by every explicit unique constraint.
    pub fn unique_sets(&self) -> Vec<&[String]> {
        let mut out: Vec<&[String]> = Vec::with_capacity(self.unique.len() + 1);
        if !self.primary_key.is_empty() {
            out.push(self.primary_key.as_slice());
        }
        for u in &self.unique {
            if !u.is_empty() {
                out.push(u.as_slice());
            }
        }
        out
    }

    /// Is there a primary key or unique constraint on exactly this set of columns?
    pub fn has_unique_exactly(&self, cols: &[&str]) -> bool {
        let mut want: Vec<&str> = cols.to_vec();
        want.sort_unstable();
        want.dedup();
        self.unique_sets().into_iter().any(|set| {
            let mut have: Vec<&str> = set.iter().map(|s| s.as_str()).collect();
            have.sort_unstable();
            have.dedup();
            have == want
        })
    }

    /// Single-column integer primary key, filled by storage when a row omits it.
    pub fn auto_increment_column(&self) -> Option<&str> {
        if self.primary_key.len() != 1 {
            return None;
        }
        let pk = self.primary_key[0].as_str();
        match self.get_column(pk) {
            Some(c) if c.ty == ColumnType::Int => Some(pk),
            _ => None,
        }
    }

    /// Type/nullability check of a full row image against this schema.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        for (col, v) in row.iter() {
            let def = self.get_column(col).ok_or_else(|| {
                VersionError::validation(format!("table '{}' has no column '{}'", self.name, col))
            })?;
            if let Some(ty) = v.column_type() {
                if ty != def.ty {
                    return Err(VersionError::validation(format!(
                        "column '{}.{}' expects {}, got {}",
                        self.name, col, def.ty, ty
                    ))
                    .into());
                }
            }
        }
        for def in &self.columns {
            if !def.nullable && row.get(&def.name).map(|v| v.is_null()).unwrap_or(true) {
                return Err(VersionError::validation(format!(
                    "column '{}.{}' is not nullable",
                    self.name, def.name
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Archive table descriptor matching `live`: bookkeeping columns, copies of the
    /// version-key columns, a nullable actor column and unique(key, version).
    pub fn archive_for(live: &TableSchema, name: &str, version_key: &[&str], actor_column: &str) -> Self {
        let mut s = TableSchema::new(name)
            .column(LOG_ID_COLUMN, ColumnType::Int)
            .column(VERSION_COLUMN, ColumnType::Int)
            .column(DELETED_COLUMN, ColumnType::Bool)
            .column(UPDATED_AT_COLUMN, ColumnType::Timestamp)
            .column(DATA_COLUMN, ColumnType::Json)
            .primary_key(&[LOG_ID_COLUMN]);
        for k in version_key {
            let ty = live
                .get_column(k)
                .map(|c| c.ty)
                .unwrap_or(ColumnType::Text);
            s = s.column(k, ty);
        }
        s = s.nullable_column(actor_column, ColumnType::Text);
        let mut uniq: Vec<&str> = version_key.to_vec();
        uniq.push(VERSION_COLUMN);
        s.unique(&uniq)
    }
}
