//! GraphQL form payload assembly.
//!
//! Every GraphQL POST carries the document id, a JSON-encoded variables
//! object, and the full token set from the session store, in the field
//! layout the remote service expects from its own web client.

use rand::Rng;
use serde_json::Value;

use crate::constants::{FALLBACK_COMET_REQ, FALLBACK_CSR, FALLBACK_DYN, FALLBACK_HS, FALLBACK_REV};

use super::tokens::{calculate_jazoest, TokenStore};

/// Encode the request counter in base-36, as the `__req` field requires.
pub fn encode_request_id(mut counter: u64) -> String {
    if counter == 0 {
        return "0".to_string();
    }
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while counter > 0 {
        out.push(DIGITS[(counter % 36) as usize]);
        counter /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits")
}

/// Short session tracking id in the `xxxxxx:xxxxxx:xxxxxx` shape.
pub fn generate_short_id() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let mut part = || -> String {
        (0..6)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect()
    };
    format!("{}:{}:{}", part(), part(), part())
}

/// Build the form body for one GraphQL request.
pub fn build_payload(
    tokens: &TokenStore,
    doc_id: &str,
    variables: &Value,
    friendly_name: &str,
    request_counter: u64,
) -> Vec<(String, String)> {
    let lsd = tokens.lsd().unwrap_or_default().to_string();
    let jazoest = tokens
        .get("jazoest")
        .map(str::to_string)
        .unwrap_or_else(|| calculate_jazoest(&lsd));

    let mut payload: Vec<(String, String)> = vec![
        ("av".into(), "0".into()),
        ("__aaid".into(), "0".into()),
        ("__user".into(), "0".into()),
        ("__a".into(), "1".into()),
        ("__req".into(), encode_request_id(request_counter)),
        ("__hs".into(), tokens.get_or("__hs", FALLBACK_HS).into()),
        ("dpr".into(), "1".into()),
        ("__ccg".into(), "GOOD".into()),
        ("__rev".into(), tokens.get_or("__rev", FALLBACK_REV).into()),
        ("__s".into(), generate_short_id()),
        ("__hsi".into(), tokens.get_or("__hsi", "0").into()),
        (
            "__comet_req".into(),
            tokens.get_or("__comet_req", FALLBACK_COMET_REQ).into(),
        ),
        ("lsd".into(), lsd),
        ("jazoest".into(), jazoest),
        (
            "__spin_r".into(),
            tokens.get_or("__spin_r", FALLBACK_REV).into(),
        ),
        ("__spin_b".into(), tokens.get_or("__spin_b", "trunk").into()),
        ("__spin_t".into(), tokens.get_or("__spin_t", "0").into()),
        ("__jssesw".into(), "1".into()),
        ("fb_api_caller_class".into(), "RelayModern".into()),
        ("fb_api_req_friendly_name".into(), friendly_name.into()),
        ("server_timestamps".into(), "true".into()),
        (
            "variables".into(),
            serde_json::to_string(variables).unwrap_or_else(|_| "{}".into()),
        ),
        ("doc_id".into(), doc_id.into()),
        ("__dyn".into(), tokens.get_or("__dyn", FALLBACK_DYN).into()),
        ("__csr".into(), tokens.get_or("__csr", FALLBACK_CSR).into()),
    ];

    if let Some(dtsg) = tokens.get("fb_dtsg") {
        payload.push(("fb_dtsg".into(), dtsg.into()));
    }
    if let Some(hsdp) = tokens.get("__hsdp") {
        payload.push(("__hsdp".into(), hsdp.into()));
    }
    if let Some(hblp) = tokens.get("__hblp") {
        payload.push(("__hblp".into(), hblp.into()));
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base36_encoding() {
        assert_eq!(encode_request_id(0), "0");
        assert_eq!(encode_request_id(5), "5");
        assert_eq!(encode_request_id(10), "a");
        assert_eq!(encode_request_id(35), "z");
        assert_eq!(encode_request_id(36), "10");
        assert_eq!(encode_request_id(46655), "zzz");
    }

    #[test]
    fn short_id_shape() {
        let id = generate_short_id();
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.len() == 6));
    }

    #[test]
    fn payload_carries_tokens_and_variables() {
        let mut tokens = TokenStore::default();
        tokens.insert("lsd", "AbCd".to_string());
        tokens.insert("fb_dtsg", "DTSG".to_string());
        tokens.insert("__dyn", "dynvalue".to_string());

        let variables = json!({"queryString": "solar", "first": 10});
        let payload = build_payload(&tokens, "12345", &variables, "AdLibrarySearchPaginationQuery", 3);

        let get = |key: &str| {
            payload
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("doc_id"), Some("12345"));
        assert_eq!(get("lsd"), Some("AbCd"));
        assert_eq!(get("fb_dtsg"), Some("DTSG"));
        assert_eq!(get("__dyn"), Some("dynvalue"));
        assert_eq!(get("__req"), Some("3"));
        assert_eq!(
            get("fb_api_req_friendly_name"),
            Some("AdLibrarySearchPaginationQuery")
        );
        // Variables serialize compactly, keys intact.
        let vars = get("variables").unwrap();
        assert!(vars.contains("\"queryString\":\"solar\""));
        // jazoest derives from lsd when not extracted.
        assert_eq!(get("jazoest"), Some(calculate_jazoest("AbCd").as_str()));
    }
}
