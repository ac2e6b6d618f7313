/*!
 * JSON helpers for provider bodies whose shape we do not control.
 *
 * Nothing in here fails: a missing path, a wrong type or an unparseable date all
 * come back as `None`, and callers decide whether that matters.
 */

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Follow a dotted path (`data.requestId`, `Result.Id`, `Result[0].Id`).
/// Property names match case-insensitively when there is no exact match.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        let (name, index) = split_index(segment);
        if !name.is_empty() {
            current = property(current, name)?;
        }
        if let Some(index) = index {
            current = current.as_array()?.get(index)?;
        }
    }
    Some(current)
}

fn split_index(segment: &str) -> (&str, Option<usize>) {
    match segment.find('[') {
        Some(open) if segment.ends_with(']') => {
            let index = segment[open + 1..segment.len() - 1].parse().ok();
            (&segment[..open], index)
        }
        _ => (segment, None),
    }
}

fn property<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    object.get(name).or_else(|| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Non-empty string or number at `path`, as text
pub fn string_at(root: &Value, path: &str) -> Option<String> {
    lookup_path(root, path).and_then(scalar_string)
}

/// First path that yields a non-empty scalar
pub fn first_string(root: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| string_at(root, path))
}

pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn scalar_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Dates as providers send them: RFC 3339, naive date-times, or plain dates
pub fn parse_provider_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

/// Up to `limit` leaf paths of a body, for diagnosing failed extractions
pub fn leaf_paths(root: &Value, limit: usize) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(root, String::new(), limit, &mut paths);
    paths
}

fn collect_paths(node: &Value, path: String, limit: usize, paths: &mut Vec<String>) {
    if paths.len() >= limit {
        return;
    }
    match node {
        Value::Object(object) => {
            for (name, child) in object {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{path}.{name}")
                };
                collect_paths(child, child_path, limit, paths);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_paths(item, format!("{path}[{i}]"), limit, paths);
            }
        }
        _ => {
            if paths.len() < limit {
                paths.push(path);
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
