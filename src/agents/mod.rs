//! Agent back-ends
//!
//! Each submodule drives a specific coding agent and exposes its output as a
//! stream of `StreamEvent`s via `AgentQuery`.

pub mod claude_code;

/// Truncate a string to at most `max` characters (by Unicode char boundary).
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extract the final path component (filename) from a slash-separated path.
pub(crate) fn short_path(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Keep only the last `max` characters of `s`.
pub(crate) fn tail(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn short_path_basename() {
        assert_eq!(short_path("/a/b/c.rs"), "c.rs");
        assert_eq!(short_path("c.rs"), "c.rs");
    }

    #[test]
    fn tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 1), "é");
    }
}
