use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI для VersionDB: versioned tables over a journaled MemStore
#[derive(Parser, Debug)]
#[command(name = "versiondb", version, about = "VersionDB CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Initialize a store root (journal + LOCK + tables.json)
    Init {
        #[arg(long)]
        path: PathBuf,
    },

    /// Create a versioned table and its archive from a JSON definition
    ///
    /// JSON формат:
    /// {
    ///   "name": "products",
    ///   "columns": [
    ///     {"name": "id", "type": "int"},
    ///     {"name": "product_id", "type": "int"},
    ///     {"name": "col1", "type": "text", "nullable": true}
    ///   ],
    ///   "primary_key": ["id"],
    ///   "unique": [["product_id"]],
    ///   "version_key": ["product_id"],
    ///   "ignored": []
    /// }
    /// A nullable int "log_ref" column is added when missing; the archive is
    /// "<name>_archive" unless "archive_table" is given.
    CreateTable {
        #[arg(long)]
        path: PathBuf,
        /// JSON-файл с определением таблицы
        #[arg(long)]
        spec_file: Option<PathBuf>,
        /// JSON-строка с определением (если spec_file не задан)
        #[arg(long)]
        spec_json: Option<String>,
    },

    /// Insert a live row (--set col=value, repeatable)
    Insert {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long = "set", value_name = "COL=VALUE")]
        set: Vec<String>,
        /// Actor stamped on the archive entry
        #[arg(long)]
        actor: Option<String>,
        /// Write timestamp override (RFC 3339, "YYYY-MM-DD HH:MM:SS" or unix seconds)
        #[arg(long)]
        at: Option<String>,
    },

    /// Update the live row of a key
    Update {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        table: String,
        /// Version key, "col=value[,col=value]"
        #[arg(long)]
        key: String,
        #[arg(long = "set", value_name = "COL=VALUE")]
        set: Vec<String>,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        at: Option<String>,
    },

    /// Soft-delete the live row of a key (archive keeps history + tombstone)
    Delete {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        at: Option<String>,
    },

    /// History query. No time options = latest; --t1 = as-of; --t2 = range [t1, t2)
    Get {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        table: String,
        /// Cursor: entries with log_id > N (time options ignored)
        #[arg(long)]
        since_log_id: Option<u64>,
        #[arg(long)]
        t1: Option<String>,
        #[arg(long)]
        t2: Option<String>,
        /// Comma-separated projection
        #[arg(long)]
        fields: Option<String>,
        /// Key condition "col=value[,col=value]", repeatable (OR)
        #[arg(long = "cond")]
        conds: Vec<String>,
        /// Hide tombstones
        #[arg(long)]
        exclude_deleted: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long)]
        json: bool,
    },

    /// Irreversibly remove keys from the live table and the archive
    Purge {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        table: String,
        #[arg(long = "cond", required = true)]
        conds: Vec<String>,
    },

    /// Tables, registrations and metrics. --json prints one JSON object.
    Status {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}
