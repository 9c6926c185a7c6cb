use chrono::{DateTime, Duration, Utc};
use crossterm::event::KeyCode;
use rusqlite::Connection;
use tracing::warn;

use crate::clock::Clock;
use crate::db;
use crate::flags::FlagStore;
use crate::timer::{Timer, TimerState};
use crate::types::{Project, Task, TimeEntry};

use super::AppEvent;

/// State of the `watch` screen: the running timer and what to show for it.
pub struct App<'a, F: FlagStore, C: Clock> {
    pub running: bool,
    pub db: &'a Connection,
    timer: &'a mut Timer<F, C>,
    pub task: Option<Task>,
    pub project: Option<Project>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: Option<Duration>,
    pub last_stopped: Option<TimeEntry>,
    pub status: Option<String>,
}

impl<'a, F: FlagStore, C: Clock> App<'a, F, C> {
    pub fn new(db: &'a Connection, timer: &'a mut Timer<F, C>) -> Self {
        let mut app = Self {
            running: true,
            db,
            timer,
            task: None,
            project: None,
            started_at: None,
            elapsed: None,
            last_stopped: None,
            status: None,
        };
        app.load_running_task();
        app
    }

    /// Central update function - process an event and mutate state.
    pub fn update(&mut self, event: AppEvent) {
        match event {
            AppEvent::Tick => self.elapsed = self.timer.tick(),
            AppEvent::Resumed => self.resume(),
            AppEvent::KeyPress(key) => self.handle_key(key),
        }
    }

    pub fn is_timer_running(&self) -> bool {
        matches!(self.timer.state(), TimerState::Running(_))
    }

    fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Char('s') | KeyCode::Char(' ') => self.stop(),
            KeyCode::Char('r') => self.resume(),
            _ => {}
        }
    }

    fn resume(&mut self) {
        if let Err(err) = self.timer.recover(self.db) {
            self.status = Some(format!("Failed to restore timer: {err}"));
            return;
        }
        self.load_running_task();
    }

    fn stop(&mut self) {
        let Some(task_id) = self.timer.running().map(|active| active.task_id) else {
            self.status = Some("No task running.".to_string());
            return;
        };
        match self.timer.stop(task_id, self.db) {
            Ok(Some(entry)) => {
                self.last_stopped = Some(entry);
                self.elapsed = None;
                self.started_at = None;
                self.status = None;
            }
            Ok(None) => self.status = Some("Timer was not running.".to_string()),
            Err(err) => self.status = Some(format!("Failed to stop task: {err}")),
        }
    }

    fn load_running_task(&mut self) {
        let Some(active) = self.timer.running().cloned() else {
            self.task = None;
            self.project = None;
            self.started_at = None;
            self.elapsed = None;
            return;
        };
        self.started_at = Some(active.started_at);
        self.elapsed = self.timer.tick();
        match db::query_task_by_id(active.task_id, self.db) {
            Ok(task) => {
                self.project = task
                    .as_ref()
                    .and_then(|task| db::query_project_by_id(task.project_id, self.db).ok())
                    .flatten();
                self.task = task;
            }
            Err(err) => {
                warn!(task_id = active.task_id, %err, "failed to load running task");
                self.status = Some(format!("Failed to load task: {err}"));
            }
        }
    }
}
