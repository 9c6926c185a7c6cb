/// Database migrations and schema management.
use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Creates the initial schema if it doesn't exist yet.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT    NOT NULL UNIQUE,
            color        TEXT    NOT NULL,
            archived     INTEGER NOT NULL DEFAULT 0,
            order_index  INTEGER NOT NULL,
            life_balance INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id   INTEGER NOT NULL,
            name         TEXT    NOT NULL,
            completed    INTEGER NOT NULL DEFAULT 0,
            order_index  INTEGER NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id)
        );

        CREATE TABLE IF NOT EXISTS time_entries (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id       INTEGER NOT NULL,
            start_time    TEXT    NOT NULL,
            end_time      TEXT,
            duration_secs INTEGER NOT NULL DEFAULT 0,
            memo          TEXT    NOT NULL DEFAULT '',
            FOREIGN KEY (task_id) REFERENCES tasks(id)
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_entries_task ON time_entries(task_id);
        ",
    )?;
    migrate_entries_add_satisfaction(conn)?;
    Ok(())
}

/// Databases created before satisfaction scores existed lack the column.
fn migrate_entries_add_satisfaction(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(time_entries)")?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(1)?;
        Ok(name)
    })?;
    for row in rows {
        if row? == "satisfaction_score" {
            return Ok(());
        }
    }

    info!("adding satisfaction_score column to time_entries");
    conn.execute(
        "ALTER TABLE time_entries ADD COLUMN satisfaction_score INTEGER",
        [],
    )?;
    Ok(())
}
