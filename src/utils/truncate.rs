//! Truncation Utilities
//!
//! Shrinks source excerpts for prompts while keeping both the head and the
//! tail of the text, cutting only on UTF-8 boundaries.

const APPROX_BYTES_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    Bytes(usize),
    Tokens(usize),
}

impl TruncationPolicy {
    pub fn byte_budget(&self) -> usize {
        match self {
            TruncationPolicy::Bytes(b) => *b,
            TruncationPolicy::Tokens(t) => t.saturating_mul(APPROX_BYTES_PER_TOKEN),
        }
    }
}

pub fn truncate_text(content: &str, policy: TruncationPolicy) -> String {
    let max_bytes = policy.byte_budget();

    if content.len() <= max_bytes {
        return content.to_string();
    }

    if max_bytes == 0 {
        return format!("... [{} bytes truncated] ...", content.len());
    }

    let half = max_bytes / 2;

    let mut prefix_end = half.min(content.len());
    while !content.is_char_boundary(prefix_end) {
        prefix_end -= 1;
    }

    let mut suffix_start = content.len().saturating_sub(half);
    while !content.is_char_boundary(suffix_start) {
        suffix_start += 1;
    }
    let suffix_start = suffix_start.max(prefix_end);

    let prefix = &content[..prefix_end];
    let suffix = &content[suffix_start..];
    let truncated = content.len() - (prefix.len() + suffix.len());

    format!("{}\n... [{} bytes truncated] ...\n{}", prefix, truncated, suffix)
}

pub fn approx_token_count(text: &str) -> usize {
    text.len().saturating_add(APPROX_BYTES_PER_TOKEN - 1) / APPROX_BYTES_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_text("fn main() {}", TruncationPolicy::Bytes(64)), "fn main() {}");
    }

    #[test]
    fn test_keeps_head_and_tail() {
        let text = format!("HEAD{}TAIL", "x".repeat(1000));
        let out = truncate_text(&text, TruncationPolicy::Bytes(16));
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(out.contains("bytes truncated"));
    }

    #[test]
    fn test_respects_utf8_boundaries() {
        let text = "é".repeat(100);
        // must not panic on a multi-byte boundary
        let out = truncate_text(&text, TruncationPolicy::Bytes(11));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn test_token_budget() {
        assert_eq!(TruncationPolicy::Tokens(10).byte_budget(), 40);
        assert_eq!(approx_token_count("abcde"), 2);
    }
}
