pub mod delete;
pub mod init;
pub mod list;
pub mod restore;
pub mod save;
pub mod show;
pub mod submit;
pub mod sync;
pub mod update;
pub mod watch;

use chrono::{Local, TimeZone};

/// Render a draft's `createdAt` for terminal output.
pub fn format_created_at(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("@{}", millis),
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
