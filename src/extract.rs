use serde_json::{Map, Value};

const FENCE: &str = "```";

/// Extract a JSON object from free-form model output.
///
/// Tries, in order: the whole text, the interior of the first fenced block,
/// and the span from the first `{` to the last `}`. A tier only succeeds if
/// it yields a non-empty object; `{}`, arrays and scalars fall through to the
/// next tier.
pub fn extract_structured(text: &str) -> Option<Map<String, Value>> {
    parse_whole(text)
        .or_else(|| parse_fenced_block(text))
        .or_else(|| parse_brace_span(text))
}

/// Parse the entire text as a JSON object
fn parse_whole(text: &str) -> Option<Map<String, Value>> {
    parse_object(text)
}

/// Parse the interior of the first ``` fenced block, optionally tagged `json`
fn parse_fenced_block(text: &str) -> Option<Map<String, Value>> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let after_tag = after_open.strip_prefix("json").unwrap_or(after_open);
    let close = after_tag.find(FENCE)?;

    parse_object(after_tag[..close].trim())
}

/// Parse the substring between the first `{` and the last `}`
fn parse_brace_span(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    parse_object(&text[start..=end])
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}
