//! Token and document-id extraction from the landing page.
//!
//! The values the GraphQL endpoint requires are embedded in script payloads
//! on the ad library landing page. Extraction is regex-based with a declared
//! priority order per token; the first matching pattern wins. Tokens absent
//! from the document fall back to build-time constants at verification time,
//! except the CSRF token `lsd`, which is mandatory.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use regex::Regex;
use tracing::{debug, warn};

use crate::constants::{
    FALLBACK_ASBD_ID, FALLBACK_COMET_REQ, FALLBACK_CSR, FALLBACK_DYN, FALLBACK_HS, FALLBACK_REV,
    FALLBACK_V,
};

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("token pattern")
}

/// Priority-ordered extraction patterns per token key. Each pattern captures
/// the token value in group 1.
static TOKEN_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    vec![
        (
            "lsd",
            vec![
                rx(r#""LSD",\[\],\{"token":"([^"]+)"\}"#),
                rx(r#"\["LSD",\[\],\{"token":"([^"]+)""#),
                rx(r#""lsd":"([^"]+)""#),
                rx(r#"name="lsd" value="([^"]+)""#),
            ],
        ),
        (
            "__rev",
            vec![
                rx(r#""__spin_r":(\d+)"#),
                rx(r#""server_revision":(\d+)"#),
                rx(r#""revision":(\d+)"#),
                rx(r#"\{"__spin_r":(\d+)"#),
            ],
        ),
        ("__spin_t", vec![rx(r#""__spin_t":(\d+)"#)]),
        ("__spin_b", vec![rx(r#""__spin_b":"([^"]+)""#)]),
        (
            "__hsi",
            vec![rx(r#""__hsi":"(\d+)""#), rx(r#""hsi":"(\d+)""#)],
        ),
        (
            "fb_dtsg",
            vec![rx(r#""DTSGInitialData",\[\],\{"token":"([^"]+)""#)],
        ),
        ("__dyn", vec![rx(r#""__dyn":"([^"]+)""#)]),
        ("__csr", vec![rx(r#""__csr":"([^"]+)""#)]),
        ("__hs", vec![rx(r#""__hs":"([^"]+)""#)]),
        ("__hsdp", vec![rx(r#""__hsdp":"([^"]+)""#)]),
        ("__hblp", vec![rx(r#""__hblp":"([^"]+)""#)]),
        ("__comet_req", vec![rx(r#""__comet_req":(\d+)"#)]),
        ("jazoest", vec![rx(r#""jazoest["\s:]+(\d+)"#)]),
        ("v", vec![rx(r#""v"\s*:\s*"([a-f0-9]{4,10})""#)]),
        (
            "x-asbd-id",
            vec![
                rx(r#""asbd_id"\s*:\s*"?(\d+)"?"#),
                rx(r#"x-asbd-id["\s:]+(\d+)"#),
            ],
        ),
    ]
});

/// Last-ditch pattern for `lsd` when every declared pattern missed.
static LSD_RESCUE: LazyLock<Regex> = LazyLock::new(|| rx(r#""token":"([^"]{20,})""#));

/// Extracted GraphQL document ids.
#[derive(Debug, Clone, Default)]
pub struct DocIds {
    pub search: Option<String>,
    pub typeahead: Option<String>,
}

/// Three alternatives for pairing a query name with its numeric document id:
/// module registration, name-then-id, and id-then-name orderings.
static DOC_ID_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        rx(r#"(?s)__d\("((?:use)?AdLibrary\w+Query)[^"]*"[^)]*\).*?["'](\d{10,20})["']"#),
        rx(
            r#""(?:name|operationName)"\s*:\s*"((?:use)?AdLibrary\w+Query)"[^}]{0,200}"(?:queryID|id|doc_id)"\s*:\s*"(\d{10,20})""#,
        ),
        rx(
            r#""(?:queryID|id|doc_id)"\s*:\s*"(\d{10,20})"[^}]{0,200}"(?:name|operationName)"\s*:\s*"((?:use)?AdLibrary\w+Query)""#,
        ),
    ]
});

/// Opaque store of short-lived session tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    values: HashMap<String, String>,
}

impl TokenStore {
    /// Run the extraction tables against the landing page HTML.
    pub fn extract(html: &str) -> Self {
        let mut values = HashMap::new();
        for (key, patterns) in TOKEN_PATTERNS.iter() {
            for pattern in patterns {
                if let Some(caps) = pattern.captures(html) {
                    values.insert(key.to_string(), caps[1].to_string());
                    break;
                }
            }
        }
        // The revision doubles as the spin revision.
        if let Some(rev) = values.get("__rev").cloned() {
            values.entry("__spin_r".to_string()).or_insert(rev);
        }

        // Alternative lsd extraction when all declared patterns missed.
        if !values.contains_key("lsd") {
            if let Some(caps) = LSD_RESCUE.captures(html) {
                debug!("lsd recovered via rescue pattern");
                values.insert("lsd".to_string(), caps[1].to_string());
            }
        }

        debug!(keys = ?values.keys().collect::<Vec<_>>(), "extracted tokens");
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    /// The mandatory CSRF token, empty-string free after verification.
    pub fn lsd(&self) -> Option<&str> {
        self.get("lsd").filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fetch a token, falling back to `fallback` when absent.
    pub fn get_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.get(key).unwrap_or(fallback)
    }

    /// Fill optional tokens that could not be extracted with their
    /// build-time or derived fallbacks. `lsd` is deliberately excluded:
    /// a session without it is unusable and must fail bootstrap.
    pub fn fill_fallbacks(&mut self) {
        let lsd = self.lsd().unwrap_or_default().to_string();

        if !self.contains("fb_dtsg") {
            self.insert("fb_dtsg", generate_dtsg());
        }
        if !self.contains("jazoest") {
            self.insert("jazoest", calculate_jazoest(&lsd));
        }
        if !self.contains("__hsi") {
            self.insert("__hsi", unix_millis().to_string());
        }
        if !self.contains("__spin_t") {
            self.insert("__spin_t", unix_seconds().to_string());
        }
        if !self.contains("__spin_b") {
            self.insert("__spin_b", "trunk".to_string());
        }
        if !self.contains("__rev") {
            self.insert("__rev", FALLBACK_REV.to_string());
        }
        if !self.contains("__spin_r") {
            let rev = self.get_or("__rev", FALLBACK_REV).to_string();
            self.insert("__spin_r", rev);
        }
        if !self.contains("__hs") {
            self.insert("__hs", FALLBACK_HS.to_string());
        }
        if !self.contains("__comet_req") {
            self.insert("__comet_req", FALLBACK_COMET_REQ.to_string());
        }
        if !self.contains("__dyn") {
            self.insert("__dyn", FALLBACK_DYN.to_string());
        }
        if !self.contains("__csr") {
            self.insert("__csr", FALLBACK_CSR.to_string());
        }
        if !self.contains("v") {
            self.insert("v", FALLBACK_V.to_string());
        }
        if !self.contains("x-asbd-id") {
            self.insert("x-asbd-id", FALLBACK_ASBD_ID.to_string());
        }
    }
}

/// Extract the two GraphQL document ids from the landing page.
///
/// Ids are re-extracted on every session refresh; a deploy can change query
/// registrations under us, so cached ids go stale with the session.
pub fn extract_doc_ids(html: &str) -> DocIds {
    let mut ids = DocIds::default();

    let mut record = |name: &str, id: &str| {
        if name.contains("SearchPagination") && ids.search.is_none() {
            debug!(name, id, "extracted search doc_id");
            ids.search = Some(id.to_string());
        } else if name.contains("Typeahead") && ids.typeahead.is_none() {
            debug!(name, id, "extracted typeahead doc_id");
            ids.typeahead = Some(id.to_string());
        }
    };

    for caps in DOC_ID_PATTERNS[0].captures_iter(html) {
        record(&caps[1], &caps[2]);
    }
    for caps in DOC_ID_PATTERNS[1].captures_iter(html) {
        record(&caps[1], &caps[2]);
    }
    // Reverse ordering: id captured first, name second.
    for caps in DOC_ID_PATTERNS[2].captures_iter(html) {
        record(&caps[2], &caps[1]);
    }

    if ids.search.is_none() && ids.typeahead.is_none() {
        warn!(
            "doc_id extraction found no matches; falling back to built-in \
             ids which may be outdated"
        );
    }
    ids
}

/// `jazoest` is 2 followed by the sum of the `lsd` byte values.
pub fn calculate_jazoest(lsd: &str) -> String {
    if lsd.is_empty() {
        return "2893".to_string();
    }
    let total: u32 = lsd.bytes().map(u32::from).sum();
    format!("{}", 2 + total)
}

/// Generate a `datr` cookie value: 24 chars of URL-safe alphabet.
pub fn generate_datr() -> String {
    random_token(24)
}

/// Generate a plausible `fb_dtsg` fallback (20-40 chars).
fn generate_dtsg() -> String {
    let len = rand::thread_rng().gen_range(20..=40);
    random_token(len)
}

fn random_token(len: usize) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
