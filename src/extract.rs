//! Pull structured pieces out of free-form model responses.

/// Text between the first `start` marker and the next `end` marker, trimmed.
/// `None` when either marker is missing.
pub fn extract_block<'a>(response: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = response.find(start)? + start.len();
    let len = response[from..].find(end)?;
    Some(response[from..from + len].trim())
}

/// The response with the first delimited block (markers included) cut out.
pub fn strip_block(response: &str, start: &str, end: &str) -> String {
    let Some(open) = response.find(start) else {
        return response.trim().to_string();
    };
    let after_open = open + start.len();
    let close = match response[after_open..].find(end) {
        Some(len) => after_open + len + end.len(),
        None => response.len(),
    };
    format!("{}{}", &response[..open], &response[close..])
        .trim()
        .to_string()
}

/// Parse the outermost `{ ... }` span of the response as JSON.
pub fn extract_json(response: &str) -> Option<serde_json::Value> {
    let stripped = strip_code_fences(response);
    let open = stripped.find('{')?;
    let close = stripped.rfind('}')?;
    if close < open {
        return None;
    }
    serde_json::from_str(&stripped[open..=close]).ok()
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let end = if lines.len() > 1 && lines[lines.len() - 1].trim_start().starts_with("```") {
        lines.len() - 1
    } else {
        lines.len()
    };
    lines[1..end].join("\n")
}
