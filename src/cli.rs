/// CLI argument parsing and command handling.
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;

use crate::app::App;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::TrackerError;
use crate::flags::FlagStore;
use crate::report::{self, format_duration};
use crate::timer::{Timer, TimerState};
use crate::types::{
    Annotation, EntryId, Project, ProjectId, ReportPeriod, SATISFACTION_RANGE, Task, TaskId,
    TimeEntry,
};
use crate::{color, db, event, tui};

#[derive(Parser)]
#[command(
    name = "lifebalance",
    version,
    about = "lifebalance - Track where your time goes and how it matches your priorities"
)]
pub struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Start the timer on a task
    Start { project: String, task: String },
    /// Stop the running timer
    Stop {
        #[arg(short, long)]
        memo: Option<String>,
        /// Satisfaction score from 1 to 5
        #[arg(short, long)]
        score: Option<u8>,
    },
    /// Stop the running timer (if any) and start another task
    Switch { project: String, task: String },
    /// Show the running timer
    Status,
    /// Live timer display
    Watch,
    Entry {
        #[command(subcommand)]
        command: EntryCommand,
    },
    /// Time per project for a day, week or month
    Report {
        #[arg(short, long, value_enum, default_value_t = ReportPeriod::Week)]
        period: ReportPeriod,
        /// Any date inside the period, YYYY-MM-DD. Defaults to today.
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Move the period back (negative) or forward by this many steps
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        shift: i32,
    },
    /// Delete every project, task and time entry
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    Add {
        name: String,
        /// #RRGGBB or #RRGGBBAA. A random color is picked when omitted.
        #[arg(short, long)]
        color: Option<String>,
    },
    List {
        #[arg(short, long)]
        all: bool,
    },
    Rename { name: String, new_name: String },
    Color { name: String, color: String },
    Archive { name: String },
    Unarchive { name: String },
    /// Set the share of time (0-100) this project should get
    Balance { name: String, percent: u32 },
    /// Move the project at position `from` to position `to`
    Move { from: usize, to: usize },
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    Add { project: String, name: String },
    List { project: String },
    Rename {
        project: String,
        name: String,
        new_name: String,
    },
    /// Toggle the completed flag
    Done { project: String, name: String },
    Move {
        project: String,
        from: usize,
        to: usize,
    },
    Delete { project: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum EntryCommand {
    List { project: String, task: String },
    Annotate {
        id: EntryId,
        #[arg(short, long)]
        memo: Option<String>,
        #[arg(short, long)]
        score: Option<u8>,
    },
    Delete { id: EntryId },
}

/// Execute a CLI command.
pub fn run<F: FlagStore, C: Clock>(
    command: Command,
    conn: &Connection,
    timer: &mut Timer<F, C>,
    config: &Config,
) -> Result<()> {
    match command {
        Command::Project { command } => handle_project(command, conn, timer),
        Command::Task { command } => handle_task(command, conn, timer),
        Command::Start { project, task } => {
            let task = find_task(&project, &task, conn)?;
            match timer.start(task_id(&task)?, conn)? {
                Some(_) => println!("Started '{}' in '{project}'.", task.name),
                None => println!("A timer is already running. Use `switch` to change task."),
            }
            Ok(())
        }
        Command::Stop { memo, score } => handle_stop(memo, score, conn, timer),
        Command::Switch { project, task } => {
            let task = find_task(&project, &task, conn)?;
            let (stopped, started) = timer.switch(task_id(&task)?, conn)?;
            if let Some(entry) = stopped {
                println!("Stopped after {}.", format_duration(entry.duration()));
            }
            match started {
                Some(_) => println!("Started '{}' in '{project}'.", task.name),
                None => println!("'{}' is already running.", task.name),
            }
            Ok(())
        }
        Command::Status => handle_status(conn, timer),
        Command::Watch => watch(conn, timer),
        Command::Entry { command } => handle_entry(command, conn, timer),
        Command::Report {
            period,
            date,
            shift,
        } => handle_report(period, date, shift, conn, config),
        Command::Reset { yes } => {
            if !yes {
                println!("This deletes all data. Run again with --yes to confirm.");
                return Ok(());
            }
            if let Some(task_id) = timer.running().map(|active| active.task_id) {
                timer.abandon(task_id)?;
            }
            db::delete_all(conn)?;
            println!("All data deleted.");
            Ok(())
        }
    }
}

fn watch<F: FlagStore, C: Clock>(conn: &Connection, timer: &mut Timer<F, C>) -> Result<()> {
    let mut app = App::new(conn, timer);
    let mut terminal = tui::init()?;
    let result = event::run(&mut app, &mut terminal);

    tui::restore()?;

    result
}

fn handle_project<F: FlagStore, C: Clock>(
    command: ProjectCommand,
    conn: &Connection,
    timer: &mut Timer<F, C>,
) -> Result<()> {
    match command {
        ProjectCommand::Add { name, color } => {
            let color = match color {
                Some(value) => color::normalize_hex(&value)?,
                None => color::random_color(),
            };
            db::create_project(Project::new(name.clone(), color, Utc::now()), conn)?;
            println!("Project '{name}' added.");
        }
        ProjectCommand::List { all } => {
            let projects = db::query_projects(all, conn)?;
            if projects.is_empty() {
                println!("No projects yet.");
                return Ok(());
            }
            for project in &projects {
                let archived = if project.archived { " (archived)" } else { "" };
                println!(
                    "[{}] {} {}  {}%{archived}",
                    project.order_index, project.color, project.name, project.life_balance
                );
            }
            println!("Life balance assigned: {}%", db::total_life_balance(conn)?);
        }
        ProjectCommand::Rename { name, new_name } => {
            let mut project = find_project(&name, conn)?;
            if new_name != project.name && db::check_project_exists(&new_name, conn)? {
                return Err(TrackerError::ProjectExists(new_name).into());
            }
            project.name = new_name;
            db::update_project(&project, conn)?;
        }
        ProjectCommand::Color { name, color } => {
            let mut project = find_project(&name, conn)?;
            project.color = color::normalize_hex(&color)?;
            db::update_project(&project, conn)?;
        }
        ProjectCommand::Archive { name } => set_archived(&name, true, conn)?,
        ProjectCommand::Unarchive { name } => set_archived(&name, false, conn)?,
        ProjectCommand::Balance { name, percent } => {
            let project = find_project(&name, conn)?;
            let id = project_id(&project)?;
            let applied = db::set_life_balance(id, percent, conn)?;
            if u32::from(applied) < percent {
                println!("Capped at {applied}% so the total stays within 100%.");
            }
        }
        ProjectCommand::Move { from, to } => {
            db::move_project(from, to, conn)?;
        }
        ProjectCommand::Delete { name } => {
            let project = find_project(&name, conn)?;
            let id = project_id(&project)?;
            let running = running_task(conn, timer)?;
            if let Some(task) = running.filter(|task| task.project_id == id) {
                timer.abandon(task_id(&task)?)?;
            }
            db::delete_project(id, conn)?;
            println!("Project '{name}' deleted with its tasks and time entries.");
        }
    }
    Ok(())
}

fn handle_task<F: FlagStore, C: Clock>(
    command: TaskCommand,
    conn: &Connection,
    timer: &mut Timer<F, C>,
) -> Result<()> {
    match command {
        TaskCommand::Add { project, name } => {
            let project = find_project(&project, conn)?;
            db::create_task(Task::new(project_id(&project)?, name.clone()), conn)?;
            println!("Task '{name}' added to '{}'.", project.name);
        }
        TaskCommand::List { project } => {
            let project = find_project(&project, conn)?;
            let tasks = db::query_tasks_by_project(project_id(&project)?, conn)?;
            if tasks.is_empty() {
                println!("No tasks in '{}'.", project.name);
            }
            for task in &tasks {
                let entries = db::query_entries_by_task(task_id(task)?, conn)?;
                let check = if task.completed { "x" } else { " " };
                println!(
                    "[{}] [{check}] {}  {}",
                    task.order_index,
                    task.name,
                    format_duration(report::task_total(&entries))
                );
            }
        }
        TaskCommand::Rename {
            project,
            name,
            new_name,
        } => {
            let mut task = find_task(&project, &name, conn)?;
            task.name = new_name;
            db::update_task(&task, conn)?;
        }
        TaskCommand::Done { project, name } => {
            let mut task = find_task(&project, &name, conn)?;
            task.completed = !task.completed;
            db::update_task(&task, conn)?;
        }
        TaskCommand::Move { project, from, to } => {
            let project = find_project(&project, conn)?;
            db::move_task(project_id(&project)?, from, to, conn)?;
        }
        TaskCommand::Delete { project, name } => {
            let task = find_task(&project, &name, conn)?;
            let id = task_id(&task)?;
            if timer.running().is_some_and(|active| active.task_id == id) {
                timer.abandon(id)?;
            }
            db::delete_task(id, conn)?;
            println!("Task '{name}' deleted with its time entries.");
        }
    }
    Ok(())
}

fn handle_stop<F: FlagStore, C: Clock>(
    memo: Option<String>,
    score: Option<u8>,
    conn: &Connection,
    timer: &mut Timer<F, C>,
) -> Result<()> {
    let annotation = annotation(memo, score)?;
    let Some(task_id) = timer.running().map(|active| active.task_id) else {
        println!("No timer running.");
        return Ok(());
    };
    if let Some(entry) = timer.stop_with(task_id, &annotation, conn)? {
        println!("Stopped after {}.", format_duration(entry.duration()));
    }
    Ok(())
}

fn handle_status<F: FlagStore, C: Clock>(conn: &Connection, timer: &Timer<F, C>) -> Result<()> {
    let TimerState::Running(active) = timer.state() else {
        println!("No timer running.");
        return Ok(());
    };
    let task = db::query_task_by_id(active.task_id, conn)?;
    let project = match &task {
        Some(task) => db::query_project_by_id(task.project_id, conn)?,
        None => None,
    };
    println!(
        "{} / {}  {}  (since {})",
        project.map(|p| p.name).unwrap_or_default(),
        task.map(|t| t.name).unwrap_or_default(),
        format_duration(timer.tick().unwrap_or_default()),
        local_time(active.started_at)
    );
    Ok(())
}

fn handle_entry<F: FlagStore, C: Clock>(
    command: EntryCommand,
    conn: &Connection,
    timer: &mut Timer<F, C>,
) -> Result<()> {
    match command {
        EntryCommand::List { project, task } => {
            let task = find_task(&project, &task, conn)?;
            let entries = db::query_entries_by_task(task_id(&task)?, conn)?;
            for entry in &entries {
                print_entry(entry);
            }
            println!("Total {}", format_duration(report::task_total(&entries)));
        }
        EntryCommand::Annotate { id, memo, score } => {
            let annotation = annotation(memo, score)?;
            let entry = db::annotate_entry(id, &annotation, conn)?;
            print_entry(&entry);
        }
        EntryCommand::Delete { id } => {
            if let Some(active) = timer.running().filter(|active| active.entry_id == id) {
                let task_id = active.task_id;
                timer.abandon(task_id)?;
            }
            db::delete_entry(id, conn)?;
        }
    }
    Ok(())
}

fn handle_report(
    period: ReportPeriod,
    date: Option<NaiveDate>,
    shift: i32,
    conn: &Connection,
    config: &Config,
) -> Result<()> {
    let offset = config.report_offset()?;
    let today = match offset {
        Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
        None => Local::now().date_naive(),
    };
    let reference = report::shift(date.unwrap_or(today), period, shift);

    let entries = db::query_all_entries(conn)?;
    let tasks = db::query_all_tasks(conn)?;
    let projects = db::query_projects(true, conn)?;
    let rows = match offset {
        Some(offset) => report::aggregate(
            &entries,
            &tasks,
            &projects,
            period,
            reference,
            config.week_start,
            &offset,
        ),
        None => report::aggregate(
            &entries,
            &tasks,
            &projects,
            period,
            reference,
            config.week_start,
            &Local,
        ),
    };
    info!(%period, %reference, rows = rows.len(), "report built");

    println!("{period} of {reference}");
    if rows.is_empty() {
        println!("Nothing recorded.");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{:<20} {}  {:>5.1}%  target {:>3}%  gap {:+.1}",
            row.project.name,
            format_duration(chrono::Duration::seconds(row.total_secs)),
            row.percentage,
            row.project.life_balance,
            row.balance_gap
        );
    }
    Ok(())
}

fn annotation(memo: Option<String>, score: Option<u8>) -> Result<Annotation> {
    if let Some(score) = score.filter(|score| !SATISFACTION_RANGE.contains(score)) {
        return Err(TrackerError::InvalidSatisfaction(score).into());
    }
    Ok(Annotation {
        memo,
        satisfaction: score,
    })
}

fn set_archived(name: &str, archived: bool, conn: &Connection) -> Result<()> {
    let mut project = find_project(name, conn)?;
    project.archived = archived;
    db::update_project(&project, conn)
}

fn find_project(name: &str, conn: &Connection) -> Result<Project> {
    db::query_project_by_name(name, conn)?
        .ok_or_else(|| TrackerError::ProjectNameNotFound(name.to_string()).into())
}

fn find_task(project: &str, name: &str, conn: &Connection) -> Result<Task> {
    let project = find_project(project, conn)?;
    db::query_task_by_name(project_id(&project)?, name, conn)?.ok_or_else(|| {
        TrackerError::TaskNameNotFound {
            project: project.name,
            task: name.to_string(),
        }
        .into()
    })
}

fn running_task<F: FlagStore, C: Clock>(
    conn: &Connection,
    timer: &Timer<F, C>,
) -> Result<Option<Task>> {
    match timer.running() {
        Some(active) => db::query_task_by_id(active.task_id, conn),
        None => Ok(None),
    }
}

fn project_id(project: &Project) -> Result<ProjectId> {
    project
        .id
        .ok_or_else(|| anyhow::anyhow!("project '{}' has no id", project.name))
}

fn task_id(task: &Task) -> Result<TaskId> {
    task.id
        .ok_or_else(|| anyhow::anyhow!("task '{}' has no id", task.name))
}

fn print_entry(entry: &TimeEntry) {
    let end = entry
        .end_time
        .map(local_time)
        .unwrap_or_else(|| "running".to_string());
    let score = entry
        .satisfaction
        .map(|score| format!("  {score}/5"))
        .unwrap_or_default();
    println!(
        "#{} {} - {}  {}{score}  {}",
        entry.id.unwrap_or_default(),
        local_time(entry.start_time),
        end,
        format_duration(entry.duration()),
        entry.memo
    );
}

fn local_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::init_in_memory;
    use crate::flags::MemoryFlagStore;

    fn timer() -> Timer<MemoryFlagStore, ManualClock> {
        let clock = ManualClock::starting_at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        Timer::new(MemoryFlagStore::default(), clock)
    }

    fn add(conn: &Connection, timer: &mut Timer<MemoryFlagStore, ManualClock>) {
        let config = Config::default();
        run(
            Command::Project {
                command: ProjectCommand::Add {
                    name: "Work".to_string(),
                    color: Some("ff0000".to_string()),
                },
            },
            conn,
            timer,
            &config,
        )
        .unwrap();
        run(
            Command::Task {
                command: TaskCommand::Add {
                    project: "Work".to_string(),
                    name: "Email".to_string(),
                },
            },
            conn,
            timer,
            &config,
        )
        .unwrap();
    }

    #[test]
    fn score_outside_range_is_rejected() {
        let err = annotation(None, Some(6)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::InvalidSatisfaction(6))
        ));
        assert_eq!(annotation(None, Some(5)).unwrap().satisfaction, Some(5));
    }

    #[test]
    fn project_color_is_normalized_on_add() {
        let conn = init_in_memory();
        let mut timer = timer();
        add(&conn, &mut timer);
        let project = db::query_project_by_name("Work", &conn).unwrap().unwrap();
        assert_eq!(project.color, "#FF0000");
    }

    #[test]
    fn unknown_task_is_a_typed_error() {
        let conn = init_in_memory();
        let mut timer = timer();
        add(&conn, &mut timer);
        let err = run(
            Command::Start {
                project: "Work".to_string(),
                task: "Nope".to_string(),
            },
            &conn,
            &mut timer,
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::TaskNameNotFound { .. })
        ));
    }

    #[test]
    fn deleting_the_running_task_resets_the_timer() {
        let conn = init_in_memory();
        let mut timer = timer();
        add(&conn, &mut timer);
        let config = Config::default();
        run(
            Command::Start {
                project: "Work".to_string(),
                task: "Email".to_string(),
            },
            &conn,
            &mut timer,
            &config,
        )
        .unwrap();
        assert!(timer.running().is_some());

        run(
            Command::Project {
                command: ProjectCommand::Delete {
                    name: "Work".to_string(),
                },
            },
            &conn,
            &mut timer,
            &config,
        )
        .unwrap();
        assert!(timer.running().is_none());
        assert!(db::query_open_entries(&conn).unwrap().is_empty());
        timer.recover(&conn).unwrap();
        assert_eq!(timer.state(), &TimerState::Idle);
    }

    #[test]
    fn project_rename_checks_other_names_only() {
        let conn = init_in_memory();
        let mut timer = timer();
        add(&conn, &mut timer);
        let config = Config::default();
        let rename = |name: &str, new_name: &str| Command::Project {
            command: ProjectCommand::Rename {
                name: name.to_string(),
                new_name: new_name.to_string(),
            },
        };

        run(rename("Work", "Work"), &conn, &mut timer, &config).unwrap();
        db::create_project(
            Project::new("Home".to_string(), "#000000".to_string(), Utc::now()),
            &conn,
        )
        .unwrap();
        let err = run(rename("Work", "Home"), &conn, &mut timer, &config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::ProjectExists(name)) if name == "Home"
        ));
        run(rename("Work", "Job"), &conn, &mut timer, &config).unwrap();
        assert!(db::query_project_by_name("Job", &conn).unwrap().is_some());
    }

    #[test]
    fn task_rename_onto_existing_task_fails() {
        let conn = init_in_memory();
        let mut timer = timer();
        add(&conn, &mut timer);
        let config = Config::default();
        run(
            Command::Task {
                command: TaskCommand::Add {
                    project: "Work".to_string(),
                    name: "Calls".to_string(),
                },
            },
            &conn,
            &mut timer,
            &config,
        )
        .unwrap();
        let err = run(
            Command::Task {
                command: TaskCommand::Rename {
                    project: "Work".to_string(),
                    name: "Calls".to_string(),
                    new_name: "Email".to_string(),
                },
            },
            &conn,
            &mut timer,
            &config,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::TaskExists { .. })
        ));
    }

    #[test]
    fn reset_requires_confirmation() {
        let conn = init_in_memory();
        let mut timer = timer();
        add(&conn, &mut timer);
        let config = Config::default();
        run(Command::Reset { yes: false }, &conn, &mut timer, &config).unwrap();
        assert_eq!(db::query_projects(true, &conn).unwrap().len(), 1);
        run(Command::Reset { yes: true }, &conn, &mut timer, &config).unwrap();
        assert!(db::query_projects(true, &conn).unwrap().is_empty());
    }
}
