use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::debug;

use super::{parse_optional_timestamp, parse_timestamp};
use crate::error::TrackerError;
use crate::types::{Annotation, EntryId, TaskId, TimeEntry};

const ENTRY_COLUMNS: &str =
    "id, task_id, start_time, end_time, duration_secs, memo, satisfaction_score";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimeEntry> {
    Ok(TimeEntry {
        id: Some(row.get(0)?),
        task_id: row.get(1)?,
        start_time: parse_timestamp(row.get(2)?, 2)?,
        end_time: parse_optional_timestamp(row.get(3)?, 3)?,
        duration_secs: row.get(4)?,
        memo: row.get(5)?,
        satisfaction: row.get(6)?,
    })
}

fn collect_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<TimeEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, entry_from_row)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

pub fn create_entry(entry: TimeEntry, conn: &Connection) -> Result<TimeEntry> {
    conn.execute(
        "INSERT INTO time_entries (task_id, start_time, end_time, duration_secs, memo, satisfaction_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            entry.task_id,
            entry.start_time.to_rfc3339(),
            entry.end_time.map(|dt| dt.to_rfc3339()),
            entry.duration_secs,
            entry.memo,
            entry.satisfaction,
        ],
    )?;
    let id = conn.last_insert_rowid() as EntryId;
    debug!(id, task_id = entry.task_id, "created time entry");
    Ok(TimeEntry {
        id: Some(id),
        ..entry
    })
}

/// Entries of one task, newest first.
pub fn query_entries_by_task(task_id: TaskId, conn: &Connection) -> Result<Vec<TimeEntry>> {
    collect_entries(
        conn,
        &format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE task_id = ?1 ORDER BY start_time DESC, id DESC"
        ),
        [task_id],
    )
}

pub fn query_all_entries(conn: &Connection) -> Result<Vec<TimeEntry>> {
    collect_entries(
        conn,
        &format!("SELECT {ENTRY_COLUMNS} FROM time_entries ORDER BY start_time, id"),
        [],
    )
}

pub fn query_open_entries(conn: &Connection) -> Result<Vec<TimeEntry>> {
    collect_entries(
        conn,
        &format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE end_time IS NULL ORDER BY start_time DESC, id DESC"
        ),
        [],
    )
}

pub fn query_entry_by_id(id: EntryId, conn: &Connection) -> Result<Option<TimeEntry>> {
    let mut entries = collect_entries(
        conn,
        &format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ?1"),
        [id],
    )?;
    Ok(entries.pop())
}

pub fn query_open_entry_for_task(task_id: TaskId, conn: &Connection) -> Result<Option<TimeEntry>> {
    let mut entries = collect_entries(
        conn,
        &format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE task_id = ?1 AND end_time IS NULL LIMIT 1"
        ),
        [task_id],
    )?;
    Ok(entries.pop())
}

/// Closes an entry. Only entries that are still open are touched.
pub fn finalize_entry(
    id: EntryId,
    end_time: DateTime<Utc>,
    duration_secs: i64,
    conn: &Connection,
) -> Result<TimeEntry> {
    let changed = conn.execute(
        "UPDATE time_entries SET end_time = ?1, duration_secs = ?2 WHERE id = ?3 AND end_time IS NULL",
        rusqlite::params![end_time.to_rfc3339(), duration_secs, id],
    )?;
    if changed == 0 {
        return Err(TrackerError::EntryNotFound(id).into());
    }
    debug!(id, duration_secs, "finalized time entry");
    query_entry_by_id(id, conn)?.ok_or_else(|| TrackerError::EntryNotFound(id).into())
}

/// Writes memo and satisfaction score. Fields left as `None` keep their value.
pub fn annotate_entry(id: EntryId, annotation: &Annotation, conn: &Connection) -> Result<TimeEntry> {
    let mut entry = query_entry_by_id(id, conn)?.ok_or(TrackerError::EntryNotFound(id))?;
    if let Some(memo) = &annotation.memo {
        entry.memo = memo.clone();
    }
    if let Some(score) = annotation.satisfaction {
        entry.satisfaction = Some(score);
    }
    conn.execute(
        "UPDATE time_entries SET memo = ?1, satisfaction_score = ?2 WHERE id = ?3",
        rusqlite::params![entry.memo, entry.satisfaction, id],
    )?;
    debug!(id, "annotated time entry");
    Ok(entry)
}

pub fn delete_entry(id: EntryId, conn: &Connection) -> Result<()> {
    let removed = conn.execute("DELETE FROM time_entries WHERE id = ?1", [id])?;
    if removed == 0 {
        return Err(TrackerError::EntryNotFound(id).into());
    }
    debug!(id, "deleted time entry");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::db::{self, init_in_memory};
    use crate::types::{Project, Task};

    fn setup() -> (Connection, TaskId) {
        let conn = init_in_memory();
        let project = db::create_project(
            Project::new("Work".to_string(), "#FFFFFF".to_string(), Utc::now()),
            &conn,
        )
        .unwrap();
        let task = db::create_task(Task::new(project, "Write".to_string()), &conn).unwrap();
        (conn, task)
    }

    #[test]
    fn open_entry_round_trips_without_end_time() {
        let (conn, task) = setup();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap();
        let created = create_entry(TimeEntry::open(task, start), &conn).unwrap();
        let open = query_open_entry_for_task(task, &conn).unwrap().unwrap();
        assert_eq!(open, created);
        assert!(open.is_open());
        assert_eq!(open.memo, "");
        assert_eq!(open.satisfaction, None);
    }

    #[test]
    fn finalize_only_closes_open_entries() {
        let (conn, task) = setup();
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        let entry = create_entry(TimeEntry::open(task, start), &conn).unwrap();
        let id = entry.id.unwrap();
        let end = start + Duration::minutes(45);

        let closed = finalize_entry(id, end, 2700, &conn).unwrap();
        assert_eq!(closed.end_time, Some(end));
        assert_eq!(closed.duration_secs, 2700);
        assert!(finalize_entry(id, end + Duration::minutes(1), 2760, &conn).is_err());
        assert_eq!(query_entry_by_id(id, &conn).unwrap().unwrap().duration_secs, 2700);
    }

    #[test]
    fn annotation_keeps_unset_fields() {
        let (conn, task) = setup();
        let entry = create_entry(TimeEntry::open(task, Utc::now()), &conn).unwrap();
        let id = entry.id.unwrap();
        annotate_entry(
            id,
            &Annotation {
                memo: Some("focused".to_string()),
                satisfaction: Some(4),
            },
            &conn,
        )
        .unwrap();
        let updated = annotate_entry(
            id,
            &Annotation {
                memo: None,
                satisfaction: Some(2),
            },
            &conn,
        )
        .unwrap();
        assert_eq!(updated.memo, "focused");
        assert_eq!(updated.satisfaction, Some(2));
    }

    #[test]
    fn entries_by_task_are_newest_first() {
        let (conn, task) = setup();
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        create_entry(TimeEntry::open(task, early), &conn).unwrap();
        create_entry(TimeEntry::open(task, late), &conn).unwrap();
        let entries = query_entries_by_task(task, &conn).unwrap();
        assert_eq!(entries[0].start_time, late);
        assert_eq!(entries[1].start_time, early);
    }

    #[test]
    fn deleting_missing_entry_fails() {
        let (conn, _) = setup();
        assert!(delete_entry(7, &conn).is_err());
    }
}
