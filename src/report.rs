//! Time spent per project over a calendar day, week or month.

use std::collections::HashMap;

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};

use crate::types::{Project, ProjectId, ReportPeriod, Task, TaskId, TimeEntry, WeekStart};

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectReport {
    pub project: Project,
    pub total_secs: i64,
    /// Share of the bucket's tracked time, 0..=100.
    pub percentage: f64,
    /// `percentage` minus the project's life balance target.
    pub balance_gap: f64,
}

/// Half-open UTC window `[start, end)` of the calendar bucket holding
/// `reference` in `tz`.
pub fn bucket_bounds<Tz: TimeZone>(
    period: ReportPeriod,
    reference: NaiveDate,
    week_start: WeekStart,
    tz: &Tz,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let (first, next) = match period {
        ReportPeriod::Day => (reference, reference + Duration::days(1)),
        ReportPeriod::Week => {
            let weekday = reference.weekday().num_days_from_sunday();
            let start = week_start.weekday().num_days_from_sunday();
            let offset = (7 + weekday - start) % 7;
            let first = reference - Duration::days(i64::from(offset));
            (first, first + Duration::days(7))
        }
        ReportPeriod::Month => {
            let first = reference.with_day(1).unwrap_or(reference);
            (first, first.checked_add_months(Months::new(1)).unwrap_or(first))
        }
    };
    (local_midnight(first, tz), local_midnight(next, tz))
}

/// Moves `reference` by `steps` whole periods (negative goes back).
pub fn shift(reference: NaiveDate, period: ReportPeriod, steps: i32) -> NaiveDate {
    let shifted = match period {
        ReportPeriod::Day => reference.checked_add_signed(Duration::days(i64::from(steps))),
        ReportPeriod::Week => reference.checked_add_signed(Duration::weeks(i64::from(steps))),
        ReportPeriod::Month if steps >= 0 => {
            reference.checked_add_months(Months::new(steps.unsigned_abs()))
        }
        ReportPeriod::Month => reference.checked_sub_months(Months::new(steps.unsigned_abs())),
    };
    shifted.unwrap_or(reference)
}

/// Groups finalized entries that ended inside the bucket by project.
///
/// Entries still recording, or whose task or project cannot be found, are
/// left out. Rows are ordered by total time, longest first; ties keep the
/// order in which the projects first appear in `entries`.
pub fn aggregate<Tz: TimeZone>(
    entries: &[TimeEntry],
    tasks: &[Task],
    projects: &[Project],
    period: ReportPeriod,
    reference: NaiveDate,
    week_start: WeekStart,
    tz: &Tz,
) -> Vec<ProjectReport> {
    let (start, end) = bucket_bounds(period, reference, week_start, tz);
    let tasks: HashMap<TaskId, &Task> = tasks
        .iter()
        .filter_map(|task| task.id.map(|id| (id, task)))
        .collect();
    let projects: HashMap<ProjectId, &Project> = projects
        .iter()
        .filter_map(|project| project.id.map(|id| (id, project)))
        .collect();

    let mut slots: HashMap<ProjectId, usize> = HashMap::new();
    let mut groups: Vec<(&Project, i64)> = Vec::new();
    for entry in entries {
        let Some(end_time) = entry.end_time else {
            continue;
        };
        if end_time < start || end_time >= end {
            continue;
        }
        let Some(project) = tasks
            .get(&entry.task_id)
            .and_then(|task| projects.get(&task.project_id))
            .copied()
        else {
            continue;
        };
        let Some(project_id) = project.id else {
            continue;
        };
        let slot = *slots.entry(project_id).or_insert_with(|| {
            groups.push((project, 0));
            groups.len() - 1
        });
        groups[slot].1 += entry.duration_secs;
    }

    let total: i64 = groups.iter().map(|(_, secs)| secs).sum();
    let mut rows: Vec<ProjectReport> = groups
        .into_iter()
        .map(|(project, total_secs)| {
            let percentage = if total > 0 {
                total_secs as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            ProjectReport {
                project: project.clone(),
                total_secs,
                percentage,
                balance_gap: percentage - f64::from(project.life_balance),
            }
        })
        .collect();
    rows.sort_by(|left, right| right.total_secs.cmp(&left.total_secs));
    rows
}

/// Sum of finalized durations. Open entries count as zero.
pub fn task_total(entries: &[TimeEntry]) -> Duration {
    Duration::seconds(
        entries
            .iter()
            .filter(|entry| !entry.is_open())
            .map(|entry| entry.duration_secs)
            .sum(),
    )
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Start of `date` in `tz`. When midnight falls into a DST gap the first
/// valid minute after it is used.
fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = NaiveDateTime::new(date, NaiveTime::MIN);
    let mut cursor = midnight;
    for _ in 0..=120 {
        if let Some(local) = tz.from_local_datetime(&cursor).earliest() {
            return local.with_timezone(&Utc);
        }
        cursor += Duration::minutes(1);
    }
    Utc.from_utc_datetime(&midnight)
}
