use anyhow::Result;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod util;
mod cmd_init;
mod cmd_create_table;
mod cmd_insert;
mod cmd_update;
mod cmd_delete;
mod cmd_get;
mod cmd_purge;
mod cmd_status;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт - info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Init { path } =>
            cmd_init::exec(path),

        cli::Cmd::CreateTable { path, spec_file, spec_json } =>
            cmd_create_table::exec(path, spec_file, spec_json),

        cli::Cmd::Insert { path, table, set, actor, at } =>
            cmd_insert::exec(path, table, set, actor, at),

        cli::Cmd::Update { path, table, key, set, actor, at } =>
            cmd_update::exec(path, table, key, set, actor, at),

        cli::Cmd::Delete { path, table, key, actor, at } =>
            cmd_delete::exec(path, table, key, actor, at),

        cli::Cmd::Get {
            path,
            table,
            since_log_id,
            t1,
            t2,
            fields,
            conds,
            exclude_deleted,
            page,
            page_size,
            json,
        } => cmd_get::exec(cmd_get::GetArgs {
            path,
            table,
            since_log_id,
            t1,
            t2,
            fields,
            conds,
            exclude_deleted,
            page,
            page_size,
            json,
        }),

        cli::Cmd::Purge { path, table, conds } =>
            cmd_purge::exec(path, table, conds),

        cli::Cmd::Status { path, json } =>
            cmd_status::exec(path, json),
    }
}
