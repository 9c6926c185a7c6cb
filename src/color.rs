/// Color utilities for projects.
use rand::RngExt;

use crate::error::TrackerError;

/// Validate if a string is a hex color: `#RRGGBB` or `#RRGGBBAA`, `#` optional.
pub fn is_valid_hex(s: &str) -> bool {
    let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
    matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Normalizes to `#` followed by upper-case digits.
pub fn normalize_hex(s: &str) -> Result<String, TrackerError> {
    if !is_valid_hex(s) {
        return Err(TrackerError::InvalidColor(s.to_string()));
    }
    let hex = s.trim().trim_start_matches('#');
    Ok(format!("#{}", hex.to_ascii_uppercase()))
}

/// Splits a color into its RGB channels, ignoring alpha.
pub fn rgb(s: &str) -> Option<(u8, u8, u8)> {
    if !is_valid_hex(s) {
        return None;
    }
    let hex = s.trim().trim_start_matches('#');
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Generate a random color from a predefined palette.
pub fn random_color() -> String {
    const PALETTE: &[&str] = &[
        "#FF6347", "#4682B4", "#3CB371", "#FFB347", "#9370DB", "#20B2AA", "#FF69B4",
        "#CD853F", "#6495ED", "#DAA520", "#8FBC8F", "#E9967A", "#BA55D3", "#5F9EA0",
    ];
    let mut rng = rand::rng();
    PALETTE[rng.random_range(0..PALETTE.len())].to_string()
}
