//! Line-oriented `key=value` parsing for `world.variables` (spec §4.1, §10.3).
//!
//! The teacher's own `config.rs` parsed a large ACP/quorum-shaped config
//! object; this spec's world config is a single opaque text blob, so the
//! only thing left to parse is this one format, shared by the tool sandbox
//! (`working_directory`) and anything else that reads `variables`.

use std::collections::BTreeMap;

/// Parses `text` as one `key=value` pair per line. Blank lines and lines
/// starting with `#` are ignored. Keys and values are trimmed; a line
/// without `=` is ignored rather than treated as an error, since
/// `world.variables` is an opaque, user-edited blob (spec §4.1).
pub fn parse_variables(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    map
}

/// Convenience accessor for the one variable the tool sandbox cares about.
pub fn working_directory(text: &str) -> Option<String> {
    parse_variables(text).remove("working_directory")
}

/// Whether the world is configured for streaming LLM calls (spec §4.7 step
/// 3: "choose streaming vs non-streaming per world config"). Defaults to
/// non-streaming when the variable is absent.
pub fn streaming_enabled(text: &str) -> bool {
    parse_variables(text)
        .get("streaming")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let vars = parse_variables("working_directory=/tmp/ws\nfoo=bar\n");
        assert_eq!(vars.get("working_directory").map(String::as_str), Some("/tmp/ws"));
        assert_eq!(vars.get("foo").map(String::as_str), Some("bar"));
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let vars = parse_variables("\n# comment\nworking_directory=/tmp/ws\n\n");
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn ignores_lines_without_equals() {
        let vars = parse_variables("not-a-kv-line\nworking_directory=/tmp/ws");
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn trims_whitespace_around_key_and_value() {
        let vars = parse_variables("  working_directory = /tmp/ws  ");
        assert_eq!(vars.get("working_directory").map(String::as_str), Some("/tmp/ws"));
    }

    #[test]
    fn working_directory_helper_returns_none_when_absent() {
        assert_eq!(working_directory("foo=bar"), None);
    }

    #[test]
    fn streaming_defaults_to_off() {
        assert!(!streaming_enabled(""));
        assert!(!streaming_enabled("streaming=nope"));
    }

    #[test]
    fn streaming_recognizes_truthy_values_case_insensitively() {
        assert!(streaming_enabled("streaming=true"));
        assert!(streaming_enabled("streaming=TRUE"));
        assert!(streaming_enabled("streaming=1"));
    }
}
