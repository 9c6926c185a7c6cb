/// Project-related database queries.
use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use super::{parse_timestamp, task};
use crate::error::TrackerError;
use crate::ordering;
use crate::types::{Project, ProjectId};

const PROJECT_COLUMNS: &str =
    "id, name, color, archived, order_index, life_balance, created_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        color: row.get(2)?,
        archived: row.get(3)?,
        order_index: row.get(4)?,
        life_balance: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?, 6)?,
    })
}

/// Inserts a project at the end of the list and returns its id.
pub fn create_project(mut project: Project, conn: &Connection) -> Result<ProjectId> {
    if check_project_exists(&project.name, conn)? {
        return Err(TrackerError::ProjectExists(project.name).into());
    }
    let siblings = query_projects(true, conn)?;
    ordering::assign_initial_index(&siblings, &mut project);
    conn.execute(
        "INSERT INTO projects (name, color, archived, order_index, life_balance, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            project.name,
            project.color,
            project.archived,
            project.order_index,
            project.life_balance,
            project.created_at.to_rfc3339(),
        ],
    )?;
    let id = conn.last_insert_rowid() as ProjectId;
    info!(id, name = %project.name, order_index = project.order_index, "created project");
    Ok(id)
}

/// All projects in list order. Archived projects are skipped unless asked for.
pub fn query_projects(include_archived: bool, conn: &Connection) -> Result<Vec<Project>> {
    let sql = if include_archived {
        format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY order_index, id")
    } else {
        format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE archived = 0 ORDER BY order_index, id")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], project_from_row)?;
    let mut projects = Vec::new();
    for row in rows {
        projects.push(row?);
    }
    Ok(projects)
}

pub fn query_project_by_id(id: ProjectId, conn: &Connection) -> Result<Option<Project>> {
    let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(project_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn query_project_by_name(name: &str, conn: &Connection) -> Result<Option<Project>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"))?;
    let mut rows = stmt.query([name])?;
    if let Some(row) = rows.next()? {
        Ok(Some(project_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn check_project_exists(name: &str, conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM projects WHERE name = ?1")?;
    let count: i64 = stmt.query_row([name], |row| row.get(0))?;
    Ok(count > 0)
}

/// Writes name, color, archived flag and life balance. Order is managed separately.
pub fn update_project(project: &Project, conn: &Connection) -> Result<()> {
    let id = project.id.ok_or_else(|| anyhow::anyhow!("cannot update a project without id"))?;
    let changed = conn.execute(
        "UPDATE projects SET name = ?1, color = ?2, archived = ?3, life_balance = ?4 WHERE id = ?5",
        rusqlite::params![
            project.name,
            project.color,
            project.archived,
            project.life_balance,
            id
        ],
    )?;
    if changed == 0 {
        return Err(TrackerError::ProjectNotFound(id).into());
    }
    debug!(id, "updated project");
    Ok(())
}

pub fn total_life_balance(conn: &Connection) -> Result<u32> {
    let total: i64 =
        conn.query_row("SELECT COALESCE(SUM(life_balance), 0) FROM projects", [], |row| {
            row.get(0)
        })?;
    Ok(total as u32)
}

/// Sets a project's life balance, capped so the total over all projects stays
/// at or below 100. Returns the value actually stored.
pub fn set_life_balance(id: ProjectId, requested: u32, conn: &Connection) -> Result<u8> {
    if requested > 100 {
        return Err(TrackerError::InvalidLifeBalance(requested).into());
    }
    let mut project = query_project_by_id(id, conn)?.ok_or(TrackerError::ProjectNotFound(id))?;
    let others = total_life_balance(conn)? - u32::from(project.life_balance);
    let applied = requested.min(100u32.saturating_sub(others)) as u8;
    if u32::from(applied) != requested {
        debug!(id, requested, applied, "life balance capped at 100% total");
    }
    project.life_balance = applied;
    update_project(&project, conn)?;
    Ok(applied)
}

/// Moves the project at list position `from` to `to` and renumbers the list.
pub fn move_project(from: usize, to: usize, conn: &Connection) -> Result<Vec<Project>> {
    let mut projects = query_projects(true, conn)?;
    let len = projects.len();
    if !ordering::reindex_after_move(&mut projects, from, to) {
        let position = if from >= len { from } else { to };
        return Err(TrackerError::PositionOutOfRange { position, len }.into());
    }
    let tx = conn.unchecked_transaction()?;
    write_order(&projects, &tx)?;
    tx.commit()?;
    debug!(from, to, "moved project");
    Ok(projects)
}

/// Deletes a project with all of its tasks and their time entries, then
/// closes the gap in the project order.
pub fn delete_project(id: ProjectId, conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let task_ids = task::task_ids_of_project(id, &tx)?;
    for task_id in &task_ids {
        task::delete_task_rows(*task_id, &tx)?;
    }
    let removed = tx.execute("DELETE FROM projects WHERE id = ?1", [id])?;
    if removed == 0 {
        return Err(TrackerError::ProjectNotFound(id).into());
    }
    let mut remaining = query_projects(true, &tx)?;
    ordering::reindex_after_delete(&mut remaining);
    write_order(&remaining, &tx)?;
    tx.commit()?;
    info!(id, tasks = task_ids.len(), "deleted project");
    Ok(())
}

fn write_order(projects: &[Project], conn: &Connection) -> Result<()> {
    debug_assert!(ordering::is_contiguous(projects));
    let mut stmt = conn.prepare("UPDATE projects SET order_index = ?1 WHERE id = ?2")?;
    for project in projects {
        stmt.execute(rusqlite::params![project.order_index, project.id])?;
    }
    Ok(())
}
