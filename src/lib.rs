#![allow(non_snake_case)]

// Базовые модули
pub mod consts;
pub mod error;
pub mod metrics;
pub mod config;
pub mod clock;

// Модель данных
pub mod value;   // src/value.rs - Value / ColumnType
pub mod row;     // src/row.rs - Row / VersionKey
pub mod schema;  // src/schema/{mod,validate}.rs
pub mod payload; // JSON codec для archive `data`

// Хранилище (трейты-коллабораторы + MemStore)
pub mod store;   // src/store/{mod,mem,journal,lock}.rs

// Ядро версионирования
pub mod registry;
pub mod version; // src/version/{mod,interceptor,writer}.rs
pub mod session;
pub mod query;   // src/query/{mod,conds,slice,dedup}.rs
pub mod purge;

// Удобные реэкспорты
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RegistryBuilder, VersionConfig};
pub use error::{is_conflict, is_encoding, is_validation, schema_rule, SchemaRule, VersionError};
pub use purge::PurgeStats;
pub use query::{GetOptions, HistoryRecord};
pub use registry::{Registry, TableHandle, TableSpec, Versioned};
pub use row::{Row, VersionKey};
pub use schema::{ColumnDef, TableSchema};
pub use session::Session;
pub use store::{Filter, MemStore, SchemaSource, Storage, Transaction};
pub use value::{ColumnType, Value};
