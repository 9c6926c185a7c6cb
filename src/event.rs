use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};

use crate::app::{App, AppEvent};
use crate::clock::Clock;
use crate::flags::FlagStore;

/// Display refresh period of the running timer.
const TICK_RATE: Duration = Duration::from_secs(1);

/// Polls for crossterm events and maps them to `AppEvent`s.
pub fn poll(timeout: Duration) -> Result<Option<AppEvent>> {
    if event::poll(timeout)? {
        return Ok(match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::KeyPress(key.code)),
            Event::FocusGained => Some(AppEvent::Resumed),
            Event::Resize(_, _) => Some(AppEvent::Tick),
            _ => None,
        });
    }
    Ok(Some(AppEvent::Tick))
}

/// Runs the watch loop until the user quits.
pub fn run<F: FlagStore, C: Clock>(
    app: &mut App<'_, F, C>,
    terminal: &mut crate::tui::Terminal,
) -> Result<()> {
    while app.running {
        terminal.draw(|frame| crate::ui::draw(frame, app))?;

        if let Some(event) = poll(TICK_RATE)? {
            app.update(event);
        }
    }
    Ok(())
}
