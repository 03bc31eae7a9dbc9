//! Code extraction from LLM responses.
//!
//! Models usually wrap generated code in a markdown fence, sometimes with a
//! language tag and sometimes with prose around it. Some replies skip the
//! fence entirely, in which case the whole reply is taken as the code.
//!
//! # Example
//!
//! ```
//! use reward_forge::utils::code_extraction::extract_code;
//!
//! let reply = "here:\n```python\nX=1\n```";
//! assert_eq!(extract_code(reply), "X=1");
//! assert_eq!(extract_code("  X=1  "), "X=1");
//! ```

use std::sync::OnceLock;

use regex::Regex;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Lazy body so the first closing fence ends the block.
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:([A-Za-z0-9_+\-]+)[ \t]*\r?\n|[ \t]*\r?\n?)(.*?)```")
            .expect("fence regex is valid")
    })
}

/// Returns the trimmed interior of the first fenced block, or the trimmed
/// input when the reply has no fence.
pub fn extract_code(raw: &str) -> String {
    match extract_from_code_block(raw) {
        Some(code) => code,
        None => raw.trim().to_string(),
    }
}

/// Returns the trimmed interior of the first fenced block, if any.
///
/// The optional language tag after the opening fence is dropped regardless of
/// case.
pub fn extract_from_code_block(raw: &str) -> Option<String> {
    fence_regex()
        .captures(raw)
        .and_then(|caps| caps.get(2))
        .map(|body| body.as_str().trim().to_string())
}

/// Prefers the first block tagged `lang` (case-insensitive), then falls back
/// to [`extract_code`].
///
/// Useful when a reply shows an example block before the real answer.
pub fn extract_tagged_code(raw: &str, lang: &str) -> String {
    fence_regex()
        .captures_iter(raw)
        .find(|caps| {
            caps.get(1)
                .is_some_and(|tag| tag.as_str().eq_ignore_ascii_case(lang))
        })
        .and_then(|caps| caps.get(2))
        .map(|body| body.as_str().trim().to_string())
        .unwrap_or_else(|| extract_code(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_fence() {
        assert_eq!(extract_code("here:\n```python\nX=1\n```"), "X=1");
    }

    #[test]
    fn test_no_fence_returns_trimmed_input() {
        let raw = "\n  def compute_reward(obs, terminated, truncated, info):\n    return 1.0\n ";
        assert_eq!(extract_code(raw), raw.trim());
    }

    #[test]
    fn test_untagged_fence() {
        assert_eq!(extract_code("```\nreturn 1\n```"), "return 1");
    }

    #[test]
    fn test_tag_is_case_insensitive() {
        assert_eq!(extract_code("```Python\nY = 2\n```"), "Y = 2");
        assert_eq!(extract_code("```PYTHON\nY = 2\n```"), "Y = 2");
    }

    #[test]
    fn test_first_block_wins() {
        let raw = "```python\nfirst\n```\ntext\n```python\nsecond\n```";
        assert_eq!(extract_code(raw), "first");
    }

    #[test]
    fn test_surrounding_prose_is_dropped() {
        let raw = "Sure! Here is the function:\n\n```python\ndef f():\n    return 1\n```\n\nIt rewards progress.";
        assert_eq!(extract_code(raw), "def f():\n    return 1");
    }

    #[test]
    fn test_indentation_inside_block_preserved() {
        let raw = "```python\ndef f(a):\n    if a:\n        return 1\n    return 0\n```";
        let code = extract_code(raw);
        assert!(code.contains("\n        return 1"));
    }

    #[test]
    fn test_tagged_code_prefers_matching_language() {
        let raw = "Example input:\n```json\n{\"temp\": 50}\n```\nCode:\n```python\nX=1\n```";
        assert_eq!(extract_tagged_code(raw, "python"), "X=1");
        assert_eq!(extract_tagged_code(raw, "rust"), "{\"temp\": 50}");
    }

    #[test]
    fn test_single_line_fence_keeps_code() {
        assert_eq!(extract_code("```X=1```"), "X=1");
    }

    #[test]
    fn test_unclosed_fence_falls_back_to_whole_text() {
        let raw = "```python\nX=1";
        assert_eq!(extract_code(raw), raw);
    }
}
