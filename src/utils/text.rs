pub fn truncate_utf8_prefix(value: &str, max_bytes: usize) -> String {
    if max_bytes == 0 {
        return String::new();
    }
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Shortens free text for log lines, marking the cut with an ellipsis.
pub fn abbreviate(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    format!("{}...", truncate_utf8_prefix(value, max_bytes))
}

/// Remote output decoding: invalid UTF-8 becomes U+FFFD instead of an error.
pub fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{abbreviate, decode_output, split_csv, truncate_utf8_prefix};

    #[test]
    fn truncate_utf8_prefix_does_not_split_utf8() {
        assert_eq!(truncate_utf8_prefix("a\u{1F600}b", 2), "a");
        assert_eq!(truncate_utf8_prefix("a\u{1F600}b", 5), "a\u{1F600}");
    }

    #[test]
    fn abbreviate_marks_cut() {
        assert_eq!(abbreviate("docker ps -a", 6), "docker...");
        assert_eq!(abbreviate("uptime", 6), "uptime");
    }

    #[test]
    fn decode_output_replaces_invalid_sequences() {
        let decoded = decode_output(&[b'o', b'k', 0xff, b'!']);
        assert_eq!(decoded, "ok\u{FFFD}!");
    }

    #[test]
    fn split_csv_skips_blank_items() {
        assert_eq!(
            split_csv(" 10.0.0.5, ,db01.internal,"),
            vec!["10.0.0.5".to_string(), "db01.internal".to_string()]
        );
    }
}
