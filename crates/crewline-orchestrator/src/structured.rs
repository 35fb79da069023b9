use serde::de::DeserializeOwned;

/// Strip one surrounding Markdown code fence, if present.
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    match body.split_once('\n') {
        Some((info, rest)) if !info.trim_start().starts_with('{') => rest.trim(),
        _ => body.trim(),
    }
}

/// Parse a model response that must be exactly one JSON object of type `T`.
pub(crate) fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    let body = strip_fence(raw);
    if body.is_empty() {
        return Err("empty response".to_string());
    }
    serde_json::from_str(body).map_err(|e| format!("{e} in response {body:?}"))
}
