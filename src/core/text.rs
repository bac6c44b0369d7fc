//! Text clamping helpers for subjects and activity log entries
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.0.0: Subject normalization for enriched output, UTF-8 safe truncation

/// Upper bound for an enriched subject line
pub const SUBJECT_LIMIT: usize = 100;
/// Upper bound for free-text activity descriptions
pub const ACTIVITY_DETAIL_LIMIT: usize = 500;

/// Truncate text to `limit` bytes, adding ellipsis if needed (never splits a character)
pub fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }

    // Find a safe UTF-8 boundary
    let mut end = limit.saturating_sub(3); // Room for "..."
    while !text.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Truncate an activity description to the log limit
pub fn truncate_for_activity(text: &str) -> String {
    truncate_with_ellipsis(text, ACTIVITY_DETAIL_LIMIT)
}

/// Reduce model output to a single clean subject line.
///
/// Language models like to answer with `Subject: "..."` or wrap the line in
/// quotes; both are stripped. Only the first non-empty line is kept.
pub fn normalize_subject(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();

    let without_label = line
        .strip_prefix("Subject:")
        .or_else(|| line.strip_prefix("subject:"))
        .unwrap_or(line)
        .trim();

    let unquoted = without_label
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(without_label)
        .trim();

    truncate_with_ellipsis(unquoted, SUBJECT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
    }

    #[test]
    fn test_truncate_long_text() {
        let text = "a".repeat(600);
        let result = truncate_for_activity(&text);
        assert!(result.len() <= ACTIVITY_DETAIL_LIMIT);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_utf8_safety() {
        let text = "Grüße aus München ".repeat(20);
        let result = truncate_with_ellipsis(&text, 31);
        assert!(result.len() <= 31);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_normalize_subject_strips_label_and_quotes() {
        assert_eq!(
            normalize_subject("Subject: \"Your work on graph neural networks\""),
            "Your work on graph neural networks"
        );
    }

    #[test]
    fn test_normalize_subject_keeps_first_line() {
        assert_eq!(
            normalize_subject("\n  Prospective PhD student\nExtra commentary"),
            "Prospective PhD student"
        );
    }

    #[test]
    fn test_normalize_subject_empty() {
        assert_eq!(normalize_subject("   \n  "), "");
    }

    #[test]
    fn test_normalize_subject_clamps_length() {
        let result = normalize_subject(&"x".repeat(300));
        assert!(result.len() <= SUBJECT_LIMIT);
    }
}
