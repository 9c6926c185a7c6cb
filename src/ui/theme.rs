use ratatui::style::Color;

/// Colors used by the watch screen
pub struct Theme;

impl Theme {
    /// Primary branding color, also the fallback project color
    pub fn primary() -> Color {
        Color::Magenta
    }

    /// Borders
    pub fn secondary() -> Color {
        Color::Cyan
    }

    /// Running timer
    pub fn active() -> Color {
        Color::LightGreen
    }

    pub fn warn() -> Color {
        Color::Yellow
    }

    /// Last recorded duration
    pub fn ended() -> Color {
        Color::Blue
    }

    pub fn dim() -> Color {
        Color::DarkGray
    }

    pub fn text() -> Color {
        Color::White
    }
}
