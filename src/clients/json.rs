//! JSON extraction from LLM responses.
//!
//! Models often wrap the requested object in prose or markdown fences. The
//! extraction tries, in order:
//! 1. a ```json fenced block
//! 2. a generic fenced block whose content is an object
//! 3. the whole response when it starts with `{`
//! 4. the first balanced `{...}` anywhere in the response

use regex::Regex;
use std::sync::LazyLock;

static JSON_CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").expect("Invalid regex for json code block")
});

static GENERIC_CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").expect("Invalid regex for code block")
});

/// Returns the first JSON object found in `content`, if any.
///
/// The returned text is balanced but not validated; callers still parse it.
pub fn extract_json_object(content: &str) -> Option<String> {
    let trimmed = content.trim();

    if let Some(json) = from_code_block(&JSON_CODE_BLOCK, trimmed) {
        return Some(json);
    }
    if let Some(json) = from_code_block(&GENERIC_CODE_BLOCK, trimmed) {
        return Some(json);
    }
    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return Some(trimmed[..=end].to_string());
        }
    }

    let start = trimmed.find('{')?;
    let candidate = &trimmed[start..];
    find_matching_brace(candidate).map(|end| candidate[..=end].to_string())
}

fn from_code_block(re: &Regex, content: &str) -> Option<String> {
    let caps = re.captures(content)?;
    let inner = caps.get(1)?.as_str().trim();
    if !inner.starts_with('{') {
        return None;
    }
    find_matching_brace(inner).map(|end| inner[..=end].to_string())
}

/// Finds the index of the `}` closing the object that opens `s`.
///
/// Braces inside string literals, including escaped quotes, are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
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

    #[test]
    fn test_direct_object() {
        let json = extract_json_object(r#"  {"summary": "ok"}  "#).unwrap();
        assert_eq!(json, r#"{"summary": "ok"}"#);
    }

    #[test]
    fn test_json_code_block() {
        let content = "Here you go:\n```json\n{\"sentiment\": \"mixed\"}\n```\nThanks";
        assert_eq!(
            extract_json_object(content).unwrap(),
            r#"{"sentiment": "mixed"}"#
        );
    }

    #[test]
    fn test_generic_code_block() {
        let content = "```\n{\"a\": {\"b\": 1}}\n```";
        assert_eq!(extract_json_object(content).unwrap(), r#"{"a": {"b": 1}}"#);
    }

    #[test]
    fn test_object_inside_prose() {
        let content = r#"Sure! {"summary": "uses } in text", "n": 2} Hope it helps."#;
        assert_eq!(
            extract_json_object(content).unwrap(),
            r#"{"summary": "uses } in text", "n": 2}"#
        );
    }

    #[test]
    fn test_no_object() {
        assert!(extract_json_object("The trend is about Kubernetes.").is_none());
        assert!(extract_json_object("{\"unterminated\": 1").is_none());
    }

    #[test]
    fn test_find_matching_brace_with_escapes() {
        let s = r#"{"q": "say \"}\" twice"} trailing"#;
        let end = find_matching_brace(s).unwrap();
        assert_eq!(&s[..=end], r#"{"q": "say \"}\" twice"}"#);
        assert!(find_matching_brace("}{").is_none());
    }
}
