/// Task database queries.
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use crate::error::TrackerError;
use crate::ordering;
use crate::types::{ProjectId, Task, TaskId};

const TASK_COLUMNS: &str = "id, project_id, name, completed, order_index";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: Some(row.get(0)?),
        project_id: row.get(1)?,
        name: row.get(2)?,
        completed: row.get(3)?,
        order_index: row.get(4)?,
    })
}

/// Appends a task to its project's list and returns the new id.
pub fn create_task(mut task: Task, conn: &Connection) -> Result<TaskId> {
    if super::query_project_by_id(task.project_id, conn)?.is_none() {
        return Err(TrackerError::ProjectNotFound(task.project_id).into());
    }
    check_name_free(task.project_id, &task.name, None, conn)?;
    let siblings = query_tasks_by_project(task.project_id, conn)?;
    ordering::assign_initial_index(&siblings, &mut task);
    conn.execute(
        "INSERT INTO tasks (project_id, name, completed, order_index) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![task.project_id, task.name, task.completed, task.order_index],
    )?;
    let id = conn.last_insert_rowid() as TaskId;
    info!(id, project_id = task.project_id, name = %task.name, "created task");
    Ok(id)
}

pub fn query_tasks_by_project(project_id: ProjectId, conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 ORDER BY order_index, id"
    ))?;
    let rows = stmt.query_map([project_id], task_from_row)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

pub fn query_all_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks ORDER BY project_id, order_index, id"
    ))?;
    let rows = stmt.query_map([], task_from_row)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

pub fn query_task_by_id(id: TaskId, conn: &Connection) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(task_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn query_task_by_name(
    project_id: ProjectId,
    name: &str,
    conn: &Connection,
) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1 AND name = ?2 ORDER BY order_index LIMIT 1"
    ))?;
    let mut rows = stmt.query(rusqlite::params![project_id, name])?;
    if let Some(row) = rows.next()? {
        Ok(Some(task_from_row(row)?))
    } else {
        Ok(None)
    }
}

/// Writes name and completion flag. The name must stay unique in the project.
pub fn update_task(task: &Task, conn: &Connection) -> Result<()> {
    let id = task.id.ok_or_else(|| anyhow::anyhow!("cannot update a task without id"))?;
    check_name_free(task.project_id, &task.name, Some(id), conn)?;
    let changed = conn.execute(
        "UPDATE tasks SET name = ?1, completed = ?2 WHERE id = ?3",
        rusqlite::params![task.name, task.completed, id],
    )?;
    if changed == 0 {
        return Err(TrackerError::TaskNotFound(id).into());
    }
    debug!(id, completed = task.completed, "updated task");
    Ok(())
}

pub fn move_task(
    project_id: ProjectId,
    from: usize,
    to: usize,
    conn: &Connection,
) -> Result<Vec<Task>> {
    let mut tasks = query_tasks_by_project(project_id, conn)?;
    let len = tasks.len();
    if !ordering::reindex_after_move(&mut tasks, from, to) {
        let position = if from >= len { from } else { to };
        return Err(TrackerError::PositionOutOfRange { position, len }.into());
    }
    let tx = conn.unchecked_transaction()?;
    write_order(&tasks, &tx)?;
    tx.commit()?;
    debug!(project_id, from, to, "moved task");
    Ok(tasks)
}

/// Deletes a task with its time entries and renumbers the remaining tasks of
/// the same project.
pub fn delete_task(id: TaskId, conn: &Connection) -> Result<()> {
    let task = query_task_by_id(id, conn)?.ok_or(TrackerError::TaskNotFound(id))?;
    let tx = conn.unchecked_transaction()?;
    let entries = delete_task_rows(id, &tx)?;
    let mut remaining = query_tasks_by_project(task.project_id, &tx)?;
    ordering::reindex_after_delete(&mut remaining);
    write_order(&remaining, &tx)?;
    tx.commit()?;
    info!(id, entries, "deleted task");
    Ok(())
}

/// Tasks are looked up by name within their project, so names are unique there.
fn check_name_free(
    project_id: ProjectId,
    name: &str,
    except: Option<TaskId>,
    conn: &Connection,
) -> Result<()> {
    let taken: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND name = ?2 AND id IS NOT ?3",
        rusqlite::params![project_id, name, except],
        |row| row.get(0),
    )?;
    if taken == 0 {
        return Ok(());
    }
    let project = super::query_project_by_id(project_id, conn)?
        .map(|project| project.name)
        .unwrap_or_else(|| format!("#{project_id}"));
    Err(TrackerError::TaskExists {
        project,
        task: name.to_string(),
    }
    .into())
}

pub(super) fn task_ids_of_project(project_id: ProjectId, conn: &Connection) -> Result<Vec<TaskId>> {
    let mut stmt = conn.prepare("SELECT id FROM tasks WHERE project_id = ?1")?;
    let ids = stmt
        .query_map([project_id], |row| row.get(0))?
        .collect::<Result<Vec<TaskId>, _>>()?;
    Ok(ids)
}

/// Removes a task row and its entries without touching sibling order.
/// Returns the number of entries removed.
pub(super) fn delete_task_rows(id: TaskId, conn: &Connection) -> Result<usize> {
    let entries = conn.execute("DELETE FROM time_entries WHERE task_id = ?1", [id])?;
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    Ok(entries)
}

fn write_order(tasks: &[Task], conn: &Connection) -> Result<()> {
    debug_assert!(ordering::is_contiguous(tasks));
    let mut stmt = conn.prepare("UPDATE tasks SET order_index = ?1 WHERE id = ?2")?;
    for task in tasks {
        stmt.execute(rusqlite::params![task.order_index, task.id])?;
    }
    Ok(())
}
