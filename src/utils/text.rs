/// Flattens a message body onto one line: every line is trimmed, blank lines
/// are dropped, and the rest are joined with single spaces.
#[must_use]
pub fn sanitize_message_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_newlines() {
        assert_eq!(sanitize_message_text("  ship it \r\n\r\n  today  "), "ship it today");
        assert_eq!(sanitize_message_text("one\ntwo\nthree"), "one two three");
    }

    #[test]
    fn test_sanitize_whitespace_only_is_empty() {
        assert_eq!(sanitize_message_text(" \n\t \n"), "");
    }

    #[test]
    fn test_sanitize_keeps_inner_spacing() {
        assert_eq!(sanitize_message_text("a  b"), "a  b");
    }
}
