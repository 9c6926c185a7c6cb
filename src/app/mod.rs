mod state;

use crossterm::event::KeyCode;

pub use state::App;

/// Possible input events the watch screen reacts to.
pub enum AppEvent {
    Tick,
    KeyPress(KeyCode),
    /// The terminal regained focus; the timer is rebuilt from its flags.
    Resumed,
}
