//! Tagged Response Parsing
//!
//! Models are asked to answer with `[TAG]` sections. Small models drift, so
//! `TAG:` and `**TAG**` spellings are accepted too.

fn tag_patterns(tag_name: &str) -> [String; 4] {
    let upper = tag_name.to_ascii_uppercase();
    [
        format!("[{}]", upper),
        format!("**{}**", upper),
        format!("### {}", upper),
        format!("{}:", upper),
    ]
}

fn is_line_start(text: &str, pos: usize) -> bool {
    text[..pos]
        .trim_end_matches([' ', '\t'])
        .chars()
        .next_back()
        .map_or(true, |c| c == '\n')
}

/// Find where the section starting at `start` ends: the earliest following
/// known tag, or the end of the text. Unbracketed spellings only count at the
/// start of a line so that prose like "change: ..." does not cut a section.
fn section_end(text_upper: &str, start: usize, known_tags: &[&str]) -> usize {
    let mut end = text_upper.len();
    for tag in known_tags {
        for pattern in tag_patterns(tag) {
            let bracketed = pattern.starts_with('[');
            let mut from = start;
            while let Some(idx) = text_upper[from..].find(&pattern) {
                let at = from + idx;
                if bracketed || is_line_start(text_upper, at) {
                    end = end.min(at);
                    break;
                }
                from = at + pattern.len();
            }
        }
    }
    end
}

fn clean(section: &str) -> String {
    section.trim().trim_start_matches(':').trim().trim_start_matches("**").trim().to_string()
}

/// Extract the first `tag` section. Empty sections count as missing.
pub fn extract_tag(text: &str, tag: &str, known_tags: &[&str]) -> Option<String> {
    let text_upper = text.to_ascii_uppercase();
    for pattern in tag_patterns(tag) {
        if let Some(idx) = text_upper.find(&pattern) {
            let start = idx + pattern.len();
            let end = section_end(&text_upper, start, known_tags);
            let section = clean(&text[start..end]);
            if !section.is_empty() {
                return Some(section);
            }
        }
    }
    None
}

/// Extract every `tag` section, using the first spelling that matches at all
pub fn extract_all_tags(text: &str, tag: &str, known_tags: &[&str]) -> Vec<String> {
    let text_upper = text.to_ascii_uppercase();
    for pattern in tag_patterns(tag) {
        let mut results = Vec::new();
        let mut pos = 0;
        while let Some(idx) = text_upper[pos..].find(&pattern) {
            let start = pos + idx + pattern.len();
            let end = section_end(&text_upper, start, known_tags);
            let section = clean(&text[start..end]);
            if !section.is_empty() {
                results.push(section);
            }
            pos = end.max(start);
        }
        if !results.is_empty() {
            return results;
        }
    }
    Vec::new()
}

/// Bullet or numbered list lines, with their markers stripped
pub fn list_items(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim_start_matches(|c: char| c.is_ascii_digit())
                .trim_start_matches(['.', ')'])
                .trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        })
        .collect()
}

/// Slice out the first balanced `{...}` object. Braces inside JSON strings
/// are skipped, since patches routinely contain them.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGS: &[&str] = &["ANALYSIS", "CHANGE", "TESTS"];

    #[test]
    fn test_extract_tag_variants() {
        let text = "[ANALYSIS]\nThe index is off by one.\n[TESTS]\n- add test";
        assert_eq!(extract_tag(text, "ANALYSIS", TAGS).as_deref(), Some("The index is off by one."));

        let text = "**Analysis**: lowercase works too\nTESTS: none";
        assert_eq!(extract_tag(text, "ANALYSIS", TAGS).as_deref(), Some("lowercase works too"));

        assert!(extract_tag("nothing here", "ANALYSIS", TAGS).is_none());
    }

    #[test]
    fn test_extract_all_tags() {
        let text = "[CHANGE]\n{\"a\": 1}\n[CHANGE]\n{\"a\": 2}\n[TESTS]\n- x";
        let changes = extract_all_tags(text, "CHANGE", TAGS);
        assert_eq!(changes, vec!["{\"a\": 1}".to_string(), "{\"a\": 2}".to_string()]);
    }

    #[test]
    fn test_inline_tag_words_do_not_cut_sections() {
        let text = "[ANALYSIS]\nThe tests: they never ran.\n[CHANGE]\n{}";
        assert_eq!(extract_tag(text, "ANALYSIS", TAGS).as_deref(), Some("The tests: they never ran."));
    }

    #[test]
    fn test_list_items() {
        let items = list_items("- first\n* second\n3. third\n\n");
        assert_eq!(items, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_extract_json_object_skips_string_braces() {
        let text = "noise {\"patch\": \"fn x() { if y { } }\", \"n\": {\"k\": 1}} trailing }";
        let obj = extract_json_object(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(obj).unwrap();
        assert_eq!(value["n"]["k"], 1);
    }

    #[test]
    fn test_extract_json_object_unbalanced() {
        assert!(extract_json_object("{\"open\": true").is_none());
        assert!(extract_json_object("no json").is_none());
    }
}
