//! Shared utility functions for CLI commands.

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::time::Duration;

/// Truncate a string to a maximum number of characters, adding "..." if
/// truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max_len).collect()
    }
}

/// Format an elapsed time (e.g., "850 ms", "2.41 s").
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() == 0 {
        format!("{} ms", elapsed.as_millis())
    } else {
        format!("{:.2} s", elapsed.as_secs_f64())
    }
}

/// Voice to synthesize with.
///
/// An explicit request is passed through. Otherwise the first voice in
/// sorted order is used. Backends that can run without a voice bank get
/// an empty name when they have no voices.
pub fn select_voice(
    requested: Option<&str>,
    available: &BTreeSet<String>,
    allow_empty_bank: bool,
) -> Result<String> {
    if let Some(voice) = requested {
        return Ok(voice.to_string());
    }
    match available.iter().next() {
        Some(first) => Ok(first.clone()),
        None if allow_empty_bank => Ok(String::new()),
        None => bail!("No voices available; pass --voice or --voices"),
    }
}
