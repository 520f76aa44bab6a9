//! Value normalization helpers shared by the builder and the sinks.

use crate::constants::builder::{AGE_SENTINEL, NOTE_ESCAPES};

/// Escape characters that are significant to the delimited output and the note markup.
///
/// Handles backslash, `#`, `?`, CR, LF, `|` and the sequence `'s`.
pub fn escape_note<T: AsRef<str>>(note: T) -> String {
    let mut escaped = note.as_ref().to_string();
    for (from, to) in NOTE_ESCAPES {
        if escaped.contains(from) {
            escaped = escaped.replace(from, to);
        }
    }
    escaped
}

/// Replace a missing age bound with the full-reload sentinel.
pub fn age_or_sentinel(value: Option<f64>) -> f64 {
    value.unwrap_or(AGE_SENTINEL)
}

/// Render an age bound without a trailing `.0` for whole numbers.
pub fn format_age_bound(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
