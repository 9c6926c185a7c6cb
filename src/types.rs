use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = u32;
pub type TaskId = u32;
pub type EntryId = u32;

/// A life category with a target share of the user's time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Project {
    pub id: Option<ProjectId>,
    pub name: String,
    pub color: String,
    pub archived: bool,
    pub order_index: u32,
    /// Intended percentage of tracked time, 0..=100.
    pub life_balance: u8,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, color: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            name,
            color,
            archived: false,
            order_index: 0,
            life_balance: 0,
            created_at,
        }
    }
}

/// A single unit of trackable work belonging to a project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: Option<TaskId>,
    pub project_id: ProjectId,
    pub name: String,
    pub completed: bool,
    pub order_index: u32,
}

impl Task {
    pub fn new(project_id: ProjectId, name: String) -> Self {
        Self {
            id: None,
            project_id,
            name,
            completed: false,
            order_index: 0,
        }
    }
}

/// One recorded (or still recording) interval of work on a task.
///
/// `duration_secs` is only meaningful once `end_time` is set. It is written
/// when the timer stops and never derived from the timestamps afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeEntry {
    pub id: Option<EntryId>,
    pub task_id: TaskId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub memo: String,
    pub satisfaction: Option<u8>,
}

impl TimeEntry {
    pub fn open(task_id: TaskId, start_time: DateTime<Utc>) -> Self {
        Self {
            id: None,
            task_id,
            start_time,
            end_time: None,
            duration_secs: 0,
            memo: String::new(),
            satisfaction: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs)
    }
}

/// Optional details collected when a timer stops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotation {
    pub memo: Option<String>,
    pub satisfaction: Option<u8>,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.memo.is_none() && self.satisfaction.is_none()
    }
}

pub const SATISFACTION_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportPeriod {
    Day,
    Week,
    Month,
}

/// First day of the calendar week used for weekly reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    pub fn weekday(self) -> chrono::Weekday {
        match self {
            WeekStart::Sunday => chrono::Weekday::Sun,
            WeekStart::Monday => chrono::Weekday::Mon,
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportPeriod::Day => "day",
            ReportPeriod::Week => "week",
            ReportPeriod::Month => "month",
        };
        f.write_str(label)
    }
}
