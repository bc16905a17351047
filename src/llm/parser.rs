use crate::error::{Error, Result};
use crate::models::{RawTopic, RawTopicList};

/// Topic list from an LLM reply. Accepts `{"topics": [...]}` or a bare array.
/// Each JSON-looking span is tried in order until one decodes.
pub fn parse_topics(response: &str) -> Result<Vec<RawTopic>> {
    let mut last_error = None;

    for candidate in json_candidates(response) {
        match decode_topics(&candidate) {
            Ok(topics) => return Ok(topics),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::ParseError("No valid JSON found in response".to_string())))
}

fn decode_topics(json_str: &str) -> Result<Vec<RawTopic>> {
    if json_str.starts_with('[') {
        return serde_json::from_str(json_str)
            .map_err(|e| Error::ParseError(format!("Failed to parse topic array: {}", e)));
    }

    let list: RawTopicList = serde_json::from_str(json_str)
        .map_err(|e| Error::ParseError(format!("Failed to parse LLM response: {}", e)))?;
    Ok(list.topics)
}

/// Single-sentence reply, with list markers and wrapping quotes removed.
pub fn parse_bullet(response: &str) -> Option<String> {
    let line = response.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches(['-', '*', '•'])
        .trim()
        .trim_matches('"')
        .trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Fenced code block first, then every balanced `{...}` / `[...]` span in
/// order of appearance.
fn json_candidates(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    // Try to find JSON block in markdown code blocks
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            candidates.push(text[start..start + end].trim().to_string());
        }
    } else if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip any language identifier on the same line
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with('{') || content.starts_with('[') {
                candidates.push(content.to_string());
            }
        }
    }

    // Raw JSON objects or arrays
    for (start, _) in text.match_indices(['{', '[']) {
        if let Some(span) = balanced_span(text, start) {
            if !candidates.iter().any(|c| c == span) {
                candidates.push(span.to_string());
            }
        }
    }

    candidates
}

fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
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
    fn test_extract_json_from_markdown() {
        let input = r#"Here's the analysis:
```json
{"topics": []}
```
"#;
        let candidates = json_candidates(input);
        assert_eq!(candidates[0], r#"{"topics": []}"#);
    }

    #[test]
    fn test_extract_raw_json() {
        let input = r#"The result is {"topics": [{"title": "A"}]} and nothing else"#;
        let candidates = json_candidates(input);
        assert_eq!(candidates[0], r#"{"topics": [{"title": "A"}]}"#);
    }

    #[test]
    fn test_extract_json_with_multibyte_text() {
        let input = r#"Résumé → {"topics": [{"title": "Café opens — downtown"}]}"#;
        let topics = parse_topics(input).unwrap();
        assert_eq!(topics.len(), 1);
    }

    #[test]
    fn test_bracketed_prose_before_json_is_skipped() {
        let input = r#"Topics [3]: {"topics": [{"title": "A"}, {"title": "B"}, {"title": "C"}]}"#;
        let topics = parse_topics(input).unwrap();
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[2].title, Some(serde_json::json!("C")));
    }

    #[test]
    fn test_parse_bare_array() {
        let topics = parse_topics(r#"[{"title": "A"}, {"title": "B"}]"#).unwrap();
        assert_eq!(topics.len(), 2);
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse_topics("I could not analyze this article.").is_err());
    }

    #[test]
    fn test_parse_bullet_strips_markers() {
        assert_eq!(
            parse_bullet("\n- \"Sunny and 75 today.\"\n").as_deref(),
            Some("Sunny and 75 today.")
        );
        assert_eq!(parse_bullet("   \n  "), None);
    }
}
