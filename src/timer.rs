//! Single-slot timer that records time entries for one task at a time.
//!
//! The durable flags are the source of truth for when the running interval
//! started. In-memory state is rebuilt from them by [`Timer::recover`] on
//! launch or resume, and the displayed elapsed time is always recomputed
//! from the persisted start, never accumulated.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::db;
use crate::error::TrackerError;
use crate::flags::{FlagStore, TimerFlags};
use crate::types::{Annotation, EntryId, TaskId, TimeEntry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveTimer {
    pub task_id: TaskId,
    pub entry_id: EntryId,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TimerState {
    #[default]
    Idle,
    Running(ActiveTimer),
    /// The entry is closed and waits for an optional memo and score.
    Stopping(TimeEntry),
}

pub struct Timer<F: FlagStore, C: Clock> {
    flags: F,
    clock: C,
    state: TimerState,
}

/// Elapsed time of an interval started at `started_at`, never negative.
pub fn elapsed(started_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - started_at).max(Duration::zero())
}

impl<F: FlagStore, C: Clock> Timer<F, C> {
    /// A fresh timer in `Idle`. Call [`Timer::recover`] before using it.
    pub fn new(flags: F, clock: C) -> Self {
        Self {
            flags,
            clock,
            state: TimerState::Idle,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn running(&self) -> Option<&ActiveTimer> {
        match &self.state {
            TimerState::Running(active) => Some(active),
            _ => None,
        }
    }

    /// Starts recording `task_id`. Returns `None` without touching the store
    /// when a timer is already running or the task already has an open entry.
    pub fn start(&mut self, task_id: TaskId, conn: &Connection) -> Result<Option<TimeEntry>> {
        if let TimerState::Running(active) = &self.state {
            warn!(
                task_id,
                running_task = active.task_id,
                "start ignored, a timer is already running"
            );
            return Ok(None);
        }
        if db::query_task_by_id(task_id, conn)?.is_none() {
            return Err(TrackerError::TaskNotFound(task_id).into());
        }
        if let Some(open) = db::query_open_entry_for_task(task_id, conn)? {
            warn!(task_id, entry_id = ?open.id, "start ignored, task already has an open entry");
            return Ok(None);
        }

        let now = self.clock.now();
        let entry = db::create_entry(TimeEntry::open(task_id, now), conn)?;
        let entry_id = entry.id.ok_or_else(|| anyhow::anyhow!("stored entry has no id"))?;
        TimerFlags::write(&mut self.flags, task_id, now, entry_id)?;
        self.state = TimerState::Running(ActiveTimer {
            task_id,
            entry_id,
            started_at: now,
        });
        info!(task_id, entry_id, "timer started");
        Ok(Some(entry))
    }

    /// Elapsed time of the running interval for display. Reads nothing but
    /// the clock and writes nothing.
    pub fn tick(&self) -> Option<Duration> {
        self.running()
            .map(|active| elapsed(active.started_at, self.clock.now()))
    }

    /// Stops the timer for `task_id` and returns the finalized entry.
    pub fn stop(&mut self, task_id: TaskId, conn: &Connection) -> Result<Option<TimeEntry>> {
        let closed = self.close(task_id, conn)?;
        if closed.is_some() {
            self.state = TimerState::Idle;
        }
        Ok(closed)
    }

    /// Stops the timer and writes the annotation onto the closed entry.
    pub fn stop_with(
        &mut self,
        task_id: TaskId,
        annotation: &Annotation,
        conn: &Connection,
    ) -> Result<Option<TimeEntry>> {
        if self.begin_stop(task_id, conn)?.is_none() {
            return Ok(None);
        }
        if annotation.is_empty() {
            return Ok(self.skip_annotation());
        }
        self.annotate(annotation, conn)
    }

    /// Stops the timer and holds the closed entry in `Stopping` until
    /// [`Timer::annotate`] or [`Timer::skip_annotation`] is called.
    pub fn begin_stop(&mut self, task_id: TaskId, conn: &Connection) -> Result<Option<TimeEntry>> {
        let closed = self.close(task_id, conn)?;
        if let Some(entry) = &closed {
            self.state = TimerState::Stopping(entry.clone());
        }
        Ok(closed)
    }

    pub fn annotate(
        &mut self,
        annotation: &Annotation,
        conn: &Connection,
    ) -> Result<Option<TimeEntry>> {
        let TimerState::Stopping(entry) = &self.state else {
            warn!("annotation ignored, no entry is waiting for one");
            return Ok(None);
        };
        let entry_id = entry.id.ok_or_else(|| anyhow::anyhow!("stopped entry has no id"))?;
        let annotated = db::annotate_entry(entry_id, annotation, conn)?;
        self.state = TimerState::Idle;
        Ok(Some(annotated))
    }

    pub fn skip_annotation(&mut self) -> Option<TimeEntry> {
        match std::mem::take(&mut self.state) {
            TimerState::Stopping(entry) => Some(entry),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Stops whatever is running and starts `task_id`. Returns the stopped
    /// entry (if any) and the new one.
    pub fn switch(
        &mut self,
        task_id: TaskId,
        conn: &Connection,
    ) -> Result<(Option<TimeEntry>, Option<TimeEntry>)> {
        let stopped = match self.running().map(|active| active.task_id) {
            Some(running) if running == task_id => {
                warn!(task_id, "switch ignored, task is already running");
                return Ok((None, None));
            }
            Some(running) => self.stop(running, conn)?,
            None => None,
        };
        let started = self.start(task_id, conn)?;
        Ok((stopped, started))
    }

    /// Forgets the timer of a task that is about to be deleted. Clears its
    /// flags without writing to the entry.
    pub fn abandon(&mut self, task_id: TaskId) -> Result<()> {
        TimerFlags::clear(&mut self.flags, task_id)?;
        if self.running().is_some_and(|active| active.task_id == task_id) {
            info!(task_id, "running timer abandoned");
            self.state = TimerState::Idle;
        }
        Ok(())
    }

    /// Rebuilds the state from the durable flags. Flags that point at a
    /// missing, closed or foreign entry are cleared. When no flags are valid
    /// but the store still holds an open entry, that entry is adopted.
    pub fn recover(&mut self, conn: &Connection) -> Result<&TimerState> {
        self.flags.reload()?;
        let mut candidates: Vec<ActiveTimer> = Vec::new();
        for task_id in TimerFlags::flagged_tasks(&self.flags) {
            let flags = TimerFlags::read(&self.flags, task_id);
            match self.resolve(task_id, &flags, conn)? {
                Some(active) => candidates.push(active),
                None => {
                    warn!(task_id, ?flags, "clearing stale timer flags");
                    TimerFlags::clear(&mut self.flags, task_id)?;
                }
            }
        }

        candidates.sort_by_key(|active| active.started_at);
        let restored = candidates.pop();
        for extra in candidates {
            warn!(task_id = extra.task_id, "clearing flags of a second running timer");
            TimerFlags::clear(&mut self.flags, extra.task_id)?;
        }

        self.state = match restored {
            Some(active) => {
                info!(
                    task_id = active.task_id,
                    entry_id = active.entry_id,
                    elapsed_secs = elapsed(active.started_at, self.clock.now()).num_seconds(),
                    "timer restored"
                );
                TimerState::Running(active)
            }
            None => self.adopt_open_entry(conn)?,
        };
        Ok(&self.state)
    }

    fn resolve(
        &self,
        task_id: TaskId,
        flags: &TimerFlags,
        conn: &Connection,
    ) -> Result<Option<ActiveTimer>> {
        let (true, Some(started_at), Some(entry_id)) =
            (flags.running, flags.start_time, flags.open_entry_id)
        else {
            return Ok(None);
        };
        let valid = db::query_entry_by_id(entry_id, conn)?
            .is_some_and(|entry| entry.task_id == task_id && entry.is_open());
        Ok(valid.then_some(ActiveTimer {
            task_id,
            entry_id,
            started_at,
        }))
    }

    fn adopt_open_entry(&mut self, conn: &Connection) -> Result<TimerState> {
        let Some(entry) = db::query_open_entries(conn)?.into_iter().next() else {
            return Ok(TimerState::Idle);
        };
        let Some(entry_id) = entry.id else {
            return Ok(TimerState::Idle);
        };
        TimerFlags::write(&mut self.flags, entry.task_id, entry.start_time, entry_id)?;
        info!(task_id = entry.task_id, entry_id, "adopted open entry without flags");
        Ok(TimerState::Running(ActiveTimer {
            task_id: entry.task_id,
            entry_id,
            started_at: entry.start_time,
        }))
    }

    fn close(&mut self, task_id: TaskId, conn: &Connection) -> Result<Option<TimeEntry>> {
        let active = match &self.state {
            TimerState::Running(active) if active.task_id == task_id => active.clone(),
            _ => {
                warn!(task_id, "stop ignored, timer is not running for this task");
                return Ok(None);
            }
        };

        let Some(entry) = db::query_entry_by_id(active.entry_id, conn)? else {
            warn!(task_id, entry_id = active.entry_id, "open entry vanished, resetting timer");
            TimerFlags::clear(&mut self.flags, task_id)?;
            self.state = TimerState::Idle;
            return Ok(None);
        };
        if !entry.is_open() {
            warn!(task_id, entry_id = active.entry_id, "entry was closed elsewhere, resetting timer");
            TimerFlags::clear(&mut self.flags, task_id)?;
            self.state = TimerState::Idle;
            return Ok(None);
        }

        let now = self.clock.now();
        let duration = elapsed(entry.start_time, now).num_seconds();
        let closed = db::finalize_entry(active.entry_id, now, duration, conn)?;
        TimerFlags::clear(&mut self.flags, task_id)?;
        info!(task_id, entry_id = active.entry_id, duration_secs = duration, "timer stopped");
        Ok(Some(closed))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::init_in_memory;
    use crate::flags::{JsonFlagStore, MemoryFlagStore};
    use crate::types::{Project, Task};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 9, 0, 0).unwrap()
    }

    fn setup() -> (Connection, TaskId, TaskId) {
        let conn = init_in_memory();
        let project = db::create_project(
            Project::new("Work".to_string(), "#FF0000".to_string(), t0()),
            &conn,
        )
        .unwrap();
        let a = db::create_task(Task::new(project, "Plan".to_string()), &conn).unwrap();
        let b = db::create_task(Task::new(project, "Build".to_string()), &conn).unwrap();
        (conn, a, b)
    }

    fn memory_timer(clock: &ManualClock) -> Timer<MemoryFlagStore, ManualClock> {
        Timer::new(MemoryFlagStore::default(), clock.clone())
    }

    #[test]
    fn start_then_stop_records_clock_delta() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);

        let started = timer.start(task, &conn).unwrap().unwrap();
        assert!(started.is_open());
        clock.advance(Duration::seconds(1_234));
        let stopped = timer.stop(task, &conn).unwrap().unwrap();

        assert_eq!(stopped.duration_secs, 1_234);
        let end = stopped.end_time.unwrap();
        assert_eq!((end - stopped.start_time).num_seconds(), 1_234);
        assert_eq!(timer.state(), &TimerState::Idle);
        assert!(TimerFlags::flagged_tasks(&timer.flags).is_empty());
    }

    #[test]
    fn start_persists_all_three_flags() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        let entry = timer.start(task, &conn).unwrap().unwrap();

        let flags = TimerFlags::read(&timer.flags, task);
        assert!(flags.running);
        assert_eq!(flags.start_time, Some(t0()));
        assert_eq!(flags.open_entry_id, entry.id);
    }

    #[test]
    fn tick_is_derived_from_start_time() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        assert_eq!(timer.tick(), None);
        timer.start(task, &conn).unwrap();
        clock.advance(Duration::seconds(5));
        assert_eq!(timer.tick(), Some(Duration::seconds(5)));
        clock.advance(Duration::seconds(5));
        assert_eq!(timer.tick(), Some(Duration::seconds(10)));
    }

    #[test]
    fn second_start_is_a_no_op() {
        let (conn, a, b) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(a, &conn).unwrap();

        assert!(timer.start(a, &conn).unwrap().is_none());
        assert!(timer.start(b, &conn).unwrap().is_none());
        assert_eq!(db::query_all_entries(&conn).unwrap().len(), 1);
        assert_eq!(timer.running().unwrap().task_id, a);
    }

    #[test]
    fn stop_while_idle_changes_nothing() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(task, &conn).unwrap();
        clock.advance(Duration::minutes(3));
        timer.stop(task, &conn).unwrap();
        let before = db::query_all_entries(&conn).unwrap();

        clock.advance(Duration::minutes(3));
        assert!(timer.stop(task, &conn).unwrap().is_none());
        assert_eq!(db::query_all_entries(&conn).unwrap(), before);
    }

    #[test]
    fn stop_for_another_task_is_ignored() {
        let (conn, a, b) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(a, &conn).unwrap();
        assert!(timer.stop(b, &conn).unwrap().is_none());
        assert_eq!(timer.running().unwrap().task_id, a);
    }

    #[test]
    fn start_refuses_task_with_open_entry_in_store() {
        let (conn, task, _) = setup();
        db::create_entry(TimeEntry::open(task, t0()), &conn).unwrap();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        assert!(timer.start(task, &conn).unwrap().is_none());
    }

    #[test]
    fn restart_restores_running_timer_from_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());

        let mut timer = Timer::new(JsonFlagStore::open(&path).unwrap(), clock.clone());
        let entry = timer.start(task, &conn).unwrap().unwrap();
        drop(timer);

        clock.advance(Duration::minutes(25));
        let mut relaunched = Timer::new(JsonFlagStore::open(&path).unwrap(), clock.clone());
        assert_eq!(relaunched.state(), &TimerState::Idle);
        relaunched.recover(&conn).unwrap();

        let active = relaunched.running().unwrap();
        assert_eq!(active.task_id, task);
        assert_eq!(Some(active.entry_id), entry.id);
        assert_eq!(relaunched.tick(), Some(Duration::minutes(25)));

        clock.advance(Duration::minutes(5));
        let stopped = relaunched.stop(task, &conn).unwrap().unwrap();
        assert_eq!(stopped.duration_secs, 30 * 60);
    }

    #[test]
    fn stop_after_another_process_closed_the_entry_resets_to_idle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let (conn, a, b) = setup();
        let clock = ManualClock::starting_at(t0());

        let mut watch = Timer::new(JsonFlagStore::open(&path).unwrap(), clock.clone());
        watch.start(a, &conn).unwrap().unwrap();

        let mut other = Timer::new(JsonFlagStore::open(&path).unwrap(), clock.clone());
        other.recover(&conn).unwrap();
        clock.advance(Duration::minutes(10));
        let stopped = other.stop(a, &conn).unwrap().unwrap();
        other.start(b, &conn).unwrap().unwrap();

        assert_eq!(watch.stop(a, &conn).unwrap(), None);
        assert_eq!(watch.state(), &TimerState::Idle);
        let entry = db::query_entry_by_id(stopped.id.unwrap(), &conn).unwrap().unwrap();
        assert_eq!(entry.duration_secs, 10 * 60);

        watch.recover(&conn).unwrap();
        assert_eq!(watch.running().map(|active| active.task_id), Some(b));
    }

    #[test]
    fn flags_for_deleted_entry_are_cleared() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        let entry = timer.start(task, &conn).unwrap().unwrap();
        db::delete_entry(entry.id.unwrap(), &conn).unwrap();

        timer.recover(&conn).unwrap();
        assert_eq!(timer.state(), &TimerState::Idle);
        assert!(TimerFlags::flagged_tasks(&timer.flags).is_empty());
    }

    #[test]
    fn flags_pointing_at_another_tasks_entry_are_cleared() {
        let (conn, a, b) = setup();
        let entry = db::create_entry(TimeEntry::open(a, t0()), &conn).unwrap();
        let mut flags = MemoryFlagStore::default();
        TimerFlags::write(&mut flags, b, t0(), entry.id.unwrap()).unwrap();
        let clock = ManualClock::starting_at(t0());
        let mut timer = Timer::new(flags, clock);

        timer.recover(&conn).unwrap();
        // the open entry of `a` is adopted instead
        assert_eq!(timer.running().unwrap().task_id, a);
        assert!(!TimerFlags::read(&timer.flags, b).running);
    }

    #[test]
    fn incomplete_flags_are_cleared() {
        let (conn, task, _) = setup();
        let mut flags = MemoryFlagStore::default();
        flags
            .set(&format!("timer.{task}.running"), crate::flags::FlagValue::Bool(true))
            .unwrap();
        let mut timer = Timer::new(flags, ManualClock::starting_at(t0()));
        timer.recover(&conn).unwrap();
        assert_eq!(timer.state(), &TimerState::Idle);
        assert!(timer.flags.keys().is_empty());
    }

    #[test]
    fn open_entry_without_flags_is_adopted() {
        let (conn, task, _) = setup();
        let started = t0() - Duration::hours(1);
        db::create_entry(TimeEntry::open(task, started), &conn).unwrap();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);

        timer.recover(&conn).unwrap();
        assert_eq!(timer.tick(), Some(Duration::hours(1)));
        assert!(TimerFlags::read(&timer.flags, task).running);
    }

    #[test]
    fn stopping_state_collects_annotation() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(task, &conn).unwrap();
        clock.advance(Duration::minutes(50));

        let closed = timer.begin_stop(task, &conn).unwrap().unwrap();
        assert!(matches!(timer.state(), TimerState::Stopping(_)));
        let annotation = Annotation {
            memo: Some("deep work".to_string()),
            satisfaction: Some(5),
        };
        let annotated = timer.annotate(&annotation, &conn).unwrap().unwrap();

        assert_eq!(annotated.id, closed.id);
        assert_eq!(annotated.duration_secs, 50 * 60);
        assert_eq!(annotated.memo, "deep work");
        assert_eq!(annotated.satisfaction, Some(5));
        assert_eq!(timer.state(), &TimerState::Idle);
    }

    #[test]
    fn skip_annotation_returns_to_idle() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(task, &conn).unwrap();
        timer.begin_stop(task, &conn).unwrap();
        assert!(timer.skip_annotation().is_some());
        assert_eq!(timer.state(), &TimerState::Idle);
        assert!(timer.annotate(&Annotation::default(), &conn).unwrap().is_none());
    }

    #[test]
    fn switch_stops_the_running_task_first() {
        let (conn, a, b) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(a, &conn).unwrap();
        clock.advance(Duration::minutes(10));

        let (stopped, started) = timer.switch(b, &conn).unwrap();
        assert_eq!(stopped.unwrap().duration_secs, 600);
        assert_eq!(started.unwrap().task_id, b);
        assert_eq!(timer.running().unwrap().task_id, b);
        assert_eq!(db::query_open_entries(&conn).unwrap().len(), 1);
    }

    #[test]
    fn abandon_clears_flags_of_deleted_task() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(task, &conn).unwrap();
        timer.abandon(task).unwrap();
        db::delete_task(task, &conn).unwrap();

        assert_eq!(timer.state(), &TimerState::Idle);
        timer.recover(&conn).unwrap();
        assert_eq!(timer.state(), &TimerState::Idle);
    }

    #[test]
    fn clock_running_backwards_gives_zero_duration() {
        let (conn, task, _) = setup();
        let clock = ManualClock::starting_at(t0());
        let mut timer = memory_timer(&clock);
        timer.start(task, &conn).unwrap();
        clock.advance(Duration::seconds(-30));
        assert_eq!(timer.stop(task, &conn).unwrap().unwrap().duration_secs, 0);
    }
}
