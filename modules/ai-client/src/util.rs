/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn clip_to_bytes(s: &str, max_bytes: usize) -> &str {
    match s.char_indices().find(|(i, c)| i + c.len_utf8() > max_bytes) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

/// The JSON part of a model answer.
///
/// Models wrap structured answers in markdown fences or a sentence of prose.
/// Fences are removed first; if what is left still does not start with `{`,
/// the slice from the first `{` to the last `}` is returned. Anything else
/// comes back trimmed and unchanged so the caller's parser reports it.
pub fn json_payload(answer: &str) -> &str {
    let mut body = answer.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.strip_suffix("```").unwrap_or(body).trim();
    }

    if body.starts_with('{') {
        return body;
    }
    match (body.find('{'), body.rfind('}')) {
        (Some(open), Some(close)) if open < close => &body[open..=close],
        _ => body,
    }
}
