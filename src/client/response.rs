//! GraphQL response interpretation.
//!
//! Strips the anti-hijacking prefix, classifies the error envelope, and
//! navigates the handful of envelope shapes the remote service emits for
//! search and typeahead results.

use serde_json::Value;

use crate::constants::{ERROR_CODES_SESSION, ERROR_CODE_RATE_LIMIT};
use crate::error::{AdLibraryError, Result};

/// Classification of a parsed GraphQL body.
#[derive(Debug)]
pub enum GraphqlOutcome {
    /// Recognized `data` envelope.
    Data(Value),
    /// Rate-limit marker in the `errors` array.
    RateLimited { message: String },
    /// Session/auth marker in the `errors` array.
    SessionError { message: String },
}

/// Remove the `for (;;);` anti-hijacking prefix when present.
pub fn strip_js_prefix(body: &str) -> &str {
    body.strip_prefix("for (;;);").unwrap_or(body)
}

/// Parse a raw response body and classify its envelope.
pub fn classify_body(body: &str) -> Result<GraphqlOutcome> {
    let text = strip_js_prefix(body);
    let data: Value = serde_json::from_str(text).map_err(|e| {
        AdLibraryError::protocol(format!("response is not valid JSON: {e}"), body)
    })?;

    if let Some(errors) = data.get("errors").and_then(Value::as_array) {
        for error in errors {
            let code = error.get("code").and_then(Value::as_i64);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();

            if code == Some(ERROR_CODE_RATE_LIMIT)
                || message.to_lowercase().contains("rate limit")
            {
                return Ok(GraphqlOutcome::RateLimited { message });
            }
            if code.is_some_and(|c| ERROR_CODES_SESSION.contains(&c))
                || message.to_lowercase().contains("session")
            {
                return Ok(GraphqlOutcome::SessionError { message });
            }
        }
        if data.get("data").map_or(true, Value::is_null) {
            return Err(AdLibraryError::protocol(
                format!("graphql errors: {errors:?}"),
                body,
            ));
        }
    }

    if data.get("data").map_or(true, Value::is_null) {
        return Err(AdLibraryError::protocol("response lacks a data envelope", body));
    }

    Ok(GraphqlOutcome::Data(data))
}

/// One page of raw search results plus its pagination cursor.
#[derive(Debug, Default)]
pub struct SearchPage {
    /// Flattened collated results, one value per ad record.
    pub ads: Vec<Value>,
    /// Cursor for the next page, when the response reports one.
    pub next_cursor: Option<String>,
}

/// Navigate the search envelope and flatten collated results.
///
/// The connection lives under `ad_library_main.search_results_connection`
/// or its camelCase twin; each edge node wraps the ads of one collation in
/// `collated_results`, with an optional `snapshot` object whose fields are
/// overlaid (without overwriting) onto the flat record.
pub fn parse_search_page(data: &Value) -> SearchPage {
    let root = data.get("data").unwrap_or(data);

    let connection = root
        .get("ad_library_main")
        .and_then(|m| m.get("search_results_connection"))
        .or_else(|| {
            root.get("adLibraryMain")
                .and_then(|m| m.get("searchResultsConnection"))
        })
        .unwrap_or(root);

    let page_info = connection
        .get("page_info")
        .or_else(|| connection.get("pageInfo"))
        .cloned()
        .unwrap_or(Value::Null);

    let has_next = page_info
        .get("has_next_page")
        .or_else(|| page_info.get("hasNextPage"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let next_cursor = if has_next {
        page_info
            .get("end_cursor")
            .or_else(|| page_info.get("endCursor"))
            .and_then(Value::as_str)
            .map(str::to_string)
    } else {
        None
    };

    let mut ads = Vec::new();
    if let Some(edges) = connection.get("edges").and_then(Value::as_array) {
        for edge in edges {
            let node = edge.get("node").unwrap_or(edge);
            let Some(collated) = node.get("collated_results").and_then(Value::as_array) else {
                continue;
            };
            for record in collated {
                ads.push(flatten_snapshot(record));
            }
        }
    }

    SearchPage { ads, next_cursor }
}

/// Overlay `snapshot` fields onto the record without overwriting existing
/// top-level keys. Newer responses put creative data directly on the
/// record; older ones nest it under `snapshot`.
fn flatten_snapshot(record: &Value) -> Value {
    let mut flat = record.clone();
    let (Some(obj), Some(snapshot)) = (
        flat.as_object_mut(),
        record.get("snapshot").and_then(Value::as_object),
    ) else {
        return flat;
    };
    for (key, value) in snapshot {
        obj.entry(key.clone()).or_insert_with(|| value.clone());
    }
    flat
}

/// Navigate the typeahead envelope into a list of raw page suggestions.
pub fn parse_typeahead_suggestions(data: &Value) -> Vec<Value> {
    let root = data.get("data").unwrap_or(data);

    let raw = root
        .get("ad_library_main")
        .and_then(|m| m.get("typeahead_suggestions"))
        .or_else(|| {
            root.get("adLibraryMain")
                .and_then(|m| m.get("typeaheadSuggestions"))
        });

    // The suggestions value is either a list of pages or an object with a
    // page_results list, depending on the API version.
    if let Some(value) = raw {
        match value {
            Value::Array(items) => return items.clone(),
            Value::Object(map) => {
                if let Some(results) = map
                    .get("page_results")
                    .or_else(|| map.get("pageResults"))
                    .and_then(Value::as_array)
                {
                    return results.clone();
                }
            }
            _ => {}
        }
    }

    // Edge-wrapped variant.
    root.get("ad_library_main")
        .and_then(|m| m.get("typeahead_suggestions_connection"))
        .and_then(|c| c.get("edges"))
        .and_then(Value::as_array)
        .map(|edges| {
            edges
                .iter()
                .map(|edge| edge.get("node").unwrap_or(edge).clone())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_anti_hijacking_prefix() {
        assert_eq!(strip_js_prefix("for (;;);{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_js_prefix("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn classify_success() {
        let body = r#"{"data":{"ad_library_main":{}}}"#;
        assert!(matches!(
            classify_body(body).unwrap(),
            GraphqlOutcome::Data(_)
        ));
    }

    #[test]
    fn classify_rate_limit_by_code_and_message() {
        let by_code = r#"{"errors":[{"code":1675004,"message":"slow down"}]}"#;
        assert!(matches!(
            classify_body(by_code).unwrap(),
            GraphqlOutcome::RateLimited { .. }
        ));
        let by_message = r#"{"errors":[{"message":"Rate limit exceeded"}]}"#;
        assert!(matches!(
            classify_body(by_message).unwrap(),
            GraphqlOutcome::RateLimited { .. }
        ));
    }

    #[test]
    fn classify_session_error() {
        let body = r#"{"errors":[{"code":1357001,"message":"Please log in"}]}"#;
        assert!(matches!(
            classify_body(body).unwrap(),
            GraphqlOutcome::SessionError { .. }
        ));
    }

    #[test]
    fn classify_parse_failure_keeps_body() {
        let err = classify_body("<html>not json</html>").unwrap_err();
        match err {
            AdLibraryError::Protocol { body, .. } => assert!(body.contains("not json")),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn classify_missing_data_envelope() {
        assert!(classify_body(r#"{"something":1}"#).is_err());
        assert!(classify_body(r#"{"data":null}"#).is_err());
    }

    fn search_envelope(casing: &str, ads: Vec<Value>, cursor: Option<&str>) -> Value {
        let edges: Vec<Value> = ads
            .into_iter()
            .map(|ad| json!({"node": {"collated_results": [ad]}}))
            .collect();
        let connection = json!({
            "edges": edges,
            "page_info": {
                "has_next_page": cursor.is_some(),
                "end_cursor": cursor
            }
        });
        match casing {
            "snake" => json!({"data": {"ad_library_main": {"search_results_connection": connection}}}),
            _ => {
                let connection = json!({
                    "edges": connection["edges"],
                    "pageInfo": {
                        "hasNextPage": cursor.is_some(),
                        "endCursor": cursor
                    }
                });
                json!({"data": {"adLibraryMain": {"searchResultsConnection": connection}}})
            }
        }
    }

    #[test]
    fn parses_snake_case_envelope() {
        let data = search_envelope(
            "snake",
            vec![json!({"ad_archive_id": "1"}), json!({"ad_archive_id": "2"})],
            Some("cursor-2"),
        );
        let page = parse_search_page(&data);
        assert_eq!(page.ads.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-2"));
    }

    #[test]
    fn parses_camel_case_envelope() {
        let data = search_envelope("camel", vec![json!({"ad_archive_id": "9"})], None);
        let page = parse_search_page(&data);
        assert_eq!(page.ads.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn no_cursor_when_has_next_is_false() {
        // end_cursor may be present while has_next_page is false.
        let data = json!({"data": {"ad_library_main": {"search_results_connection": {
            "edges": [],
            "page_info": {"has_next_page": false, "end_cursor": "stale"}
        }}}});
        let page = parse_search_page(&data);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn snapshot_fields_overlay_without_overwriting() {
        let data = search_envelope(
            "snake",
            vec![json!({
                "ad_archive_id": "5",
                "title": "top-level title",
                "snapshot": {"title": "snapshot title", "caption": "snapshot caption"}
            })],
            None,
        );
        let page = parse_search_page(&data);
        let ad = &page.ads[0];
        assert_eq!(ad["title"], "top-level title");
        assert_eq!(ad["caption"], "snapshot caption");
    }

    #[test]
    fn typeahead_dialects() {
        let listed = json!({"data": {"ad_library_main": {"typeahead_suggestions": [
            {"page_id": "1"}, {"page_id": "2"}
        ]}}});
        assert_eq!(parse_typeahead_suggestions(&listed).len(), 2);

        let wrapped = json!({"data": {"ad_library_main": {"typeahead_suggestions": {
            "page_results": [{"page_id": "3"}]
        }}}});
        assert_eq!(parse_typeahead_suggestions(&wrapped).len(), 1);

        let edged = json!({"data": {"ad_library_main": {"typeahead_suggestions_connection": {
            "edges": [{"node": {"page_id": "4"}}]
        }}}});
        let items = parse_typeahead_suggestions(&edged);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["page_id"], "4");

        assert!(parse_typeahead_suggestions(&json!({"data": {}})).is_empty());
    }
}
