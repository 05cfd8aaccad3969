use chrono::{DateTime, Local};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub text: String,
}

pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses the entry onto one line. Returns `None` for blank input.
pub fn normalize_entry(entry: &str) -> Option<String> {
    let line = single_line(entry);
    (!line.is_empty()).then_some(line)
}

/// One history record. The text is collapsed onto a single line.
pub fn format_entry(text: &str, at: DateTime<Local>) -> String {
    format!("[{}] {}\n\n", at.format(TIMESTAMP_FORMAT), single_line(text))
}

/// Reads back lines written by [`format_entry`]. Anything else in the file
/// (headings, notes added by hand) is skipped.
pub fn parse_history(content: &str) -> Vec<HistoryEntry> {
    content
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix('[')?;
            let (timestamp, text) = rest.split_once("] ")?;
            Some(HistoryEntry {
                timestamp: timestamp.to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}
