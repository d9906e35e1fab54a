// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Order-ID extraction (§3). Derived from an inbound "paid, awaiting
//! shipment" card by pulling a numeric token out of one of three URL shapes
//! embedded in the card's JSON. Ties break by first successful extraction.

use serde_json::Value;

/// Extracts the order id from a decoded card payload, trying each URL shape
/// in order and stopping at the first success.
pub fn extract_order_id(card: &Value) -> Option<String> {
    extract_from_button_target_url(card)
        .or_else(|| extract_from_main_target_url(card))
        .or_else(|| extract_from_dynamic_operation(card))
}

fn extract_from_button_target_url(card: &Value) -> Option<String> {
    let url = card.get("button")?.get("targetUrl")?.as_str()?;
    extract_order_id_param(url)
}

fn extract_from_main_target_url(card: &Value) -> Option<String> {
    let url = card.get("targetUrl")?.as_str()?;
    extract_order_detail_id(url)
}

fn extract_from_dynamic_operation(card: &Value) -> Option<String> {
    let url = card
        .get("dynamicOperation")?
        .get("changeContent")?
        .get("targetUrl")?
        .as_str()?;
    extract_order_id_param(url).or_else(|| extract_order_detail_id(url))
}

/// `...orderId=12345...`
fn extract_order_id_param(url: &str) -> Option<String> {
    extract_query_param(url, "orderId")
}

/// `...order_detail?id=12345...`
fn extract_order_detail_id(url: &str) -> Option<String> {
    if !url.contains("order_detail") {
        return None;
    }
    extract_query_param(url, "id")
}

fn extract_query_param(url: &str, key: &str) -> Option<String> {
    let needle = format!("{key}=");
    let start = url.find(&needle)? + needle.len();
    let rest = &url[start..];
    let end = rest.find(['&', '#']).unwrap_or(rest.len());
    let value = &rest[..end];
    if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
        Some(value.to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_from_button_target_url() {
        let card = json!({ "button": { "targetUrl": "https://market/x?orderId=555&foo=1" } });
        assert_eq!(extract_order_id(&card).as_deref(), Some("555"));
    }

    #[test]
    fn extracts_from_main_target_url_order_detail() {
        let card = json!({ "targetUrl": "https://market/order_detail?id=556" });
        assert_eq!(extract_order_id(&card).as_deref(), Some("556"));
    }

    #[test]
    fn extracts_from_dynamic_operation() {
        let card = json!({
            "dynamicOperation": { "changeContent": { "targetUrl": "https://market/x?orderId=557" } }
        });
        assert_eq!(extract_order_id(&card).as_deref(), Some("557"));
    }

    #[test]
    fn first_successful_extraction_wins() {
        let card = json!({
            "button": { "targetUrl": "https://market/x?orderId=111" },
            "targetUrl": "https://market/order_detail?id=222",
        });
        assert_eq!(extract_order_id(&card).as_deref(), Some("111"));
    }

    #[test]
    fn returns_none_when_absent() {
        let card = json!({ "targetUrl": "https://market/other" });
        assert_eq!(extract_order_id(&card), None);
    }
}
