/// Database module with project, task and time entry queries and migrations.
mod entries;
mod migrations;
mod project;
mod task;

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

pub use entries::{
    annotate_entry, create_entry, delete_entry, finalize_entry, query_all_entries,
    query_entries_by_task, query_entry_by_id, query_open_entries, query_open_entry_for_task,
};
pub use project::{
    check_project_exists, create_project, delete_project, move_project, query_project_by_id,
    query_project_by_name, query_projects, set_life_balance, total_life_balance, update_project,
};
pub use task::{
    create_task, delete_task, move_task, query_all_tasks, query_task_by_id, query_task_by_name,
    query_tasks_by_project, update_task,
};

/// Opens (or creates) the SQLite database and runs migrations.
pub fn init(db_path: &Path) -> Result<Connection> {
    debug!(path = %db_path.display(), "opening database");
    let conn = Connection::open(db_path)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// In-memory database with the full schema, used by tests.
#[cfg(test)]
pub fn init_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("in-memory database should open");
    migrations::run_migrations(&conn).expect("migrations should run on a fresh database");
    conn
}

/// Returns the default database path inside the user's data directory.
/// Falls back to `./lifebalance.db` when no data dir is found.
pub fn default_db_path() -> PathBuf {
    match crate::config::data_dir() {
        Some(dir) => dir.join("lifebalance.db"),
        None => PathBuf::from("lifebalance.db"),
    }
}

/// Removes every time entry, task and project.
pub fn delete_all(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let entries = tx.execute("DELETE FROM time_entries", [])?;
    let tasks = tx.execute("DELETE FROM tasks", [])?;
    let projects = tx.execute("DELETE FROM projects", [])?;
    tx.commit()?;
    info!(projects, tasks, entries, "deleted all data");
    Ok(())
}

fn parse_timestamp(raw: String, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn parse_optional_timestamp(
    raw: Option<String>,
    column: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_timestamp(value, column)).transpose()
}
