// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Item-ID extraction order (§4.5): `reminderUrl?itemId=...` → recursive
//! search for `itemId|item_id|id` keys yielding ≥10-digit values → fallback
//! synthetic `auto_<user>_<now>`. Synthetic IDs are never persisted.

use serde_json::Value;

const MIN_ITEM_ID_DIGITS: usize = 10;

pub fn extract_item_id(reminder_url: Option<&str>, body: &Value, user_id: &str, now_secs: i64) -> String {
    if let Some(url) = reminder_url {
        if let Some(id) = extract_item_id_from_url(url) {
            return id;
        }
    }
    if let Some(id) = search_item_id_keys(body) {
        return id;
    }
    format!("auto_{user_id}_{now_secs}")
}

/// `true` when `item_id` was synthesized rather than extracted — callers must
/// not persist a synthetic id (§4.5).
pub fn is_synthetic(item_id: &str) -> bool {
    item_id.starts_with("auto_")
}

fn extract_item_id_from_url(url: &str) -> Option<String> {
    let needle = "itemId=";
    let start = url.find(needle)? + needle.len();
    let rest = &url[start..];
    let end = rest.find(['&', '#']).unwrap_or(rest.len());
    let value = &rest[..end];
    if value.len() >= MIN_ITEM_ID_DIGITS && value.chars().all(|c| c.is_ascii_digit()) {
        Some(value.to_owned())
    } else {
        None
    }
}

/// Recursively searches `value` for `itemId`, `item_id`, or `id` keys whose
/// value is a ≥10-digit numeric string (or number).
fn search_item_id_keys(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for key in ["itemId", "item_id", "id"] {
                if let Some(candidate) = map.get(key).and_then(value_as_long_digit_string) {
                    return Some(candidate);
                }
            }
            for nested in map.values() {
                if let Some(found) = search_item_id_keys(nested) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(search_item_id_keys),
        _ => None,
    }
}

fn value_as_long_digit_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.len() >= MIN_ITEM_ID_DIGITS && text.chars().all(|c| c.is_ascii_digit()) {
        Some(text)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_reminder_url() {
        let body = json!({});
        let item = extract_item_id(Some("https://x?itemId=7700112233"), &body, "user1", 1000);
        assert_eq!(item, "7700112233");
    }

    #[test]
    fn falls_back_to_recursive_key_search() {
        let body = json!({ "outer": { "itemId": "8800112233" } });
        let item = extract_item_id(None, &body, "user1", 1000);
        assert_eq!(item, "8800112233");
    }

    #[test]
    fn falls_back_to_synthetic_and_marks_it() {
        let body = json!({});
        let item = extract_item_id(None, &body, "user1", 1000);
        assert_eq!(item, "auto_user1_1000");
        assert!(is_synthetic(&item));
    }

    #[test]
    fn rejects_short_numeric_ids() {
        let body = json!({ "itemId": "12345" });
        let item = extract_item_id(None, &body, "user1", 1000);
        assert!(is_synthetic(&item));
    }
}
