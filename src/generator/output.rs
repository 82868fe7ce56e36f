//! Mining structured data out of generator output
//!
//! Generators wrap their answers in prose and markdown fences. The plan
//! extractor looks for JSON in a code block first, then as the whole text,
//! then as the first balanced object embedded anywhere in the text.

use super::TestPlan;
use serde_json::Value;

/// Extract a JSON value from free-form generator text
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(json) = extract_from_code_block(text) {
        return Some(json);
    }

    if let Ok(json) = serde_json::from_str(text.trim()) {
        return Some(json);
    }

    find_json_object(text)
}

fn extract_from_code_block(text: &str) -> Option<Value> {
    for start_pattern in ["```json\n", "```json\r\n", "```\n"] {
        if let Some(start) = text.find(start_pattern) {
            let content_start = start + start_pattern.len();
            let remaining = &text[content_start..];

            if let Some(end) = remaining.find("```") {
                let json_str = remaining[..end].trim();
                if let Ok(json) = serde_json::from_str(json_str) {
                    return Some(json);
                }
            }
        }
    }
    None
}

/// Find the first balanced JSON object in text, respecting strings
fn find_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let remaining = &text[start..];
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in remaining.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&remaining[..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Interpret generator output as a [`TestPlan`].
///
/// Accepts `framework` or `recommended_framework`, `commands` or
/// `test_commands`, and optional `setup_commands`. Returns `None` when no
/// JSON object can be mined from the text.
pub fn parse_test_plan(raw: &str) -> Option<TestPlan> {
    let value = extract_json(raw)?;
    let obj = value.as_object()?;

    let framework = obj
        .get("framework")
        .or_else(|| obj.get("recommended_framework"))
        .and_then(|v| v.as_str())
        .map(String::from);

    let commands = string_list(obj.get("commands").or_else(|| obj.get("test_commands")));
    let setup_commands = string_list(obj.get("setup_commands"));

    Some(TestPlan {
        framework,
        setup_commands,
        commands,
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
