//! Small helpers shared across the crate.

/// Truncate a string to at most `max_chars` characters, appending "..."
/// when something was cut. Operates on character boundaries, so multi-byte
/// UTF-8 content never panics.
///
/// ```
/// use robogo::util::truncate_with_ellipsis;
///
/// assert_eq!(truncate_with_ellipsis("hello", 10), "hello");
/// assert_eq!(truncate_with_ellipsis("hello world", 5), "hello...");
/// ```
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", s[..idx].trim_end()),
        None => s.to_string(),
    }
}
