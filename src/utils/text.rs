//! Text helpers for terminal output.

/// Characters shown for a passage in human-readable listings.
pub const PREVIEW_CHARS: usize = 200;

/// First `max_chars` characters of `content`, with `...` when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Collapses runs of whitespace, including newlines, to single spaces.
pub fn single_line(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}
