use std::io;

use anyhow::Result;
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::CrosstermBackend;

/// Type alias for the terminal used by the watch screen.
pub type Terminal = ratatui::Terminal<CrosstermBackend<io::Stdout>>;

/// Raw mode, alternate screen and focus reporting. Focus events let the
/// timer resync from its saved state when the terminal comes back.
pub fn init() -> Result<Terminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let terminal = ratatui::Terminal::new(CrosstermBackend::new(stdout))?;
    Ok(terminal)
}

/// Restore the terminal to its original state.
pub fn restore() -> Result<()> {
    execute!(io::stdout(), DisableFocusChange, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}
