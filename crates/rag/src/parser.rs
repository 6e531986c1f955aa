use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

static FENCED_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("fenced object regex"));
static LAZY_FENCED_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("lazy fence regex"));

/// JSON object and Markdown summary recovered from free-form model output.
/// `json` is empty when no object could be parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedResponse {
    pub json: Map<String, Value>,
    pub markdown: String,
}

/// Splits model output into its JSON object and trailing Markdown. Never
/// fails: unparseable JSON yields an empty map.
pub fn extract_json_then_md(text: &str) -> ParsedResponse {
    let (json_part, md_part) = split_at_separator(text);
    let md_part = md_part.map(str::trim).filter(|md| !md.is_empty());

    let start = json_part.find('{');
    let end = json_part.rfind('}');
    let (json, markdown) = match (start, end) {
        (Some(start), Some(end)) if end > start => {
            let (json, consumed) = parse_candidate(json_part, start, end);
            let markdown = match md_part {
                Some(md) => md.to_string(),
                None => trailing_markdown(&json_part[consumed..]),
            };
            (json, markdown)
        }
        _ => (
            Map::new(),
            md_part.unwrap_or(text).to_string(),
        ),
    };
    ParsedResponse { json, markdown }
}

/// The first line that is exactly `---` separates JSON from Markdown.
fn split_at_separator(text: &str) -> (&str, Option<&str>) {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches('\n').trim_end_matches('\r');
        if content == "---" {
            return (&text[..offset], Some(&text[offset + line.len()..]));
        }
        offset += line.len();
    }
    (text, None)
}

/// Tries the outermost braces, then an explicit fenced block, then the first
/// balanced object. Returns the map and the byte offset just past the text
/// that was consumed as JSON.
fn parse_candidate(json_part: &str, start: usize, end: usize) -> (Map<String, Value>, usize) {
    if let Some(map) = parse_object(&clean_json_str(&json_part[start..=end])) {
        return (map, end + 1);
    }
    if let Some(caps) = LAZY_FENCED_OBJECT_RE.captures(json_part) {
        if let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) {
            if let Some(map) = parse_object(&clean_json_str(inner.as_str())) {
                debug!("parsed JSON from fenced block");
                return (map, whole.end());
            }
        }
    }
    if let Some(len) = balanced_object_len(&json_part[start..]) {
        let object = &json_part[start..start + len];
        if let Some(map) = parse_object(&clean_json_str(object)) {
            debug!("parsed JSON from first balanced object");
            return (map, start + len);
        }
    }
    debug!("model output held no parseable JSON object");
    (Map::new(), end + 1)
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn trailing_markdown(rest: &str) -> String {
    let rest = rest.trim();
    rest.strip_prefix("```")
        .map(str::trim)
        .unwrap_or(rest)
        .to_string()
}

/// Strips common noise before parsing: keeps only the content of a fenced
/// block, drops `//` comments and trailing commas outside string literals.
pub fn clean_json_str(text: &str) -> String {
    let text = FENCED_OBJECT_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out.trim().to_string()
}

/// Byte length of the balanced `{...}` object at the start of `text`.
fn balanced_object_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + 1);
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
    use serde_json::json;

    fn as_value(parsed: &ParsedResponse) -> Value {
        Value::Object(parsed.json.clone())
    }

    #[test]
    fn trailing_comma_and_separator() {
        let parsed = extract_json_then_md("{\"character\":\"X\",}\n---\nSummary");
        assert_eq!(as_value(&parsed), json!({"character": "X"}));
        assert_eq!(parsed.markdown, "Summary");
    }

    #[test]
    fn no_json_keeps_everything_as_markdown() {
        let parsed = extract_json_then_md("Just some prose.\nNo structure here.");
        assert!(parsed.json.is_empty());
        assert_eq!(parsed.markdown, "Just some prose.\nNo structure here.");
        let padded = "\n  prose with edges  \n";
        assert_eq!(extract_json_then_md(padded).markdown, padded);
    }

    #[test]
    fn fenced_block_is_unwrapped() {
        let parsed = extract_json_then_md("```json\n{\"character\":\"Y\"}\n```");
        assert_eq!(as_value(&parsed), json!({"character": "Y"}));
        assert_eq!(parsed.markdown, "");
    }

    #[test]
    fn markdown_after_object_without_separator() {
        let parsed = extract_json_then_md("```json\n{\"a\": 1}\n```\n## Summary\nText");
        assert_eq!(as_value(&parsed), json!({"a": 1}));
        assert_eq!(parsed.markdown, "## Summary\nText");
    }

    #[test]
    fn comments_are_dropped_outside_strings_only() {
        let raw = "{\n  \"url\": \"http://example.com\", // source\n  \"list\": [1, 2,],\n}";
        let parsed = extract_json_then_md(raw);
        assert_eq!(
            as_value(&parsed),
            json!({"url": "http://example.com", "list": [1, 2]})
        );
    }

    #[test]
    fn braces_in_markdown_fall_back_to_first_balanced_object() {
        let raw = "{\"character\": \"Z\", \"note\": \"a } inside\"}\nThe {set} notation";
        let parsed = extract_json_then_md(raw);
        assert_eq!(
            as_value(&parsed),
            json!({"character": "Z", "note": "a } inside"})
        );
        assert_eq!(parsed.markdown, "The {set} notation");
    }

    #[test]
    fn truncated_json_degrades_to_empty_map() {
        let parsed = extract_json_then_md("{\"character\": \"X\", \"big_five\": {\"O\": 0.5}\n---\nmd");
        assert!(parsed.json.is_empty());
        assert_eq!(parsed.markdown, "md");
    }

    #[test]
    fn separator_must_be_its_own_line() {
        let parsed = extract_json_then_md("{\"a\": \"x --- y\"}\n--- \nrest");
        assert_eq!(as_value(&parsed), json!({"a": "x --- y"}));
        assert_eq!(parsed.markdown, "--- \nrest");
    }

    #[test]
    fn no_json_with_separator_uses_markdown_part() {
        let parsed = extract_json_then_md("nothing here\n---\nThe summary");
        assert!(parsed.json.is_empty());
        assert_eq!(parsed.markdown, "The summary");
    }

    #[test]
    fn non_object_values_are_rejected() {
        assert!(parse_object("[1, 2]").is_none());
        assert!(parse_object("\"text\"").is_none());
    }
}
