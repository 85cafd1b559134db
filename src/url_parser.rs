//! Page-id extraction from the URL shapes the host service uses.

use std::sync::LazyLock;

use tracing::debug;
use url::Url;

static FACEBOOK_HOSTS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec![
        "facebook.com",
        "www.facebook.com",
        "m.facebook.com",
        "web.facebook.com",
        "mobile.facebook.com",
        "l.facebook.com",
        "business.facebook.com",
    ]
});

/// Extract a numeric page id from a page URL.
///
/// Recognized shapes:
/// - ad library URLs with a `view_all_page_id` query parameter
/// - profile URLs with an `id` query parameter
/// - direct numeric page paths (`facebook.com/123456`)
/// - trailing numeric segments (`/pages/Name/123456`)
///
/// Vanity URLs (`facebook.com/CocaCola`) cannot be resolved without a
/// network call and yield `None`. A bare numeric id passes through as-is.
pub fn extract_page_id_from_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // A bare numeric id needs no parsing.
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = match Url::parse(&with_scheme) {
        Ok(url) => url,
        Err(e) => {
            debug!(url = raw, error = %e, "failed to parse page URL");
            return None;
        }
    };

    let host = url.host_str().unwrap_or_default();
    if !FACEBOOK_HOSTS.contains(&host) {
        debug!(url = raw, "not a recognized host");
        return None;
    }

    // Explicit page ids in query parameters win.
    for (key, value) in url.query_pairs() {
        if (key == "view_all_page_id" || key == "id")
            && !value.is_empty()
            && value.chars().all(|c| c.is_ascii_digit())
        {
            return Some(value.into_owned());
        }
    }

    // Trailing numeric path segment (at least 5 digits to rule out
    // pagination numbers and the like).
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    for segment in segments.iter().rev() {
        if segment.len() >= 5 && segment.chars().all(|c| c.is_ascii_digit()) {
            return Some((*segment).to_string());
        }
    }

    if segments.len() == 1 {
        debug!(url = raw, "vanity URL, cannot resolve without a network call");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_library_view_all_page_id() {
        let url = "https://www.facebook.com/ads/library/?active_status=all&view_all_page_id=123456";
        assert_eq!(extract_page_id_from_url(url), Some("123456".to_string()));
    }

    #[test]
    fn profile_php_id() {
        let url = "https://www.facebook.com/profile.php?id=987654";
        assert_eq!(extract_page_id_from_url(url), Some("987654".to_string()));
    }

    #[test]
    fn direct_numeric_path() {
        assert_eq!(
            extract_page_id_from_url("https://m.facebook.com/123456/"),
            Some("123456".to_string())
        );
        assert_eq!(
            extract_page_id_from_url("https://www.facebook.com/pages/Some-Page/104510109601"),
            Some("104510109601".to_string())
        );
    }

    #[test]
    fn bare_numeric_id_passes_through() {
        assert_eq!(
            extract_page_id_from_url("123456"),
            Some("123456".to_string())
        );
    }

    #[test]
    fn scheme_is_optional() {
        assert_eq!(
            extract_page_id_from_url("facebook.com/123456"),
            Some("123456".to_string())
        );
    }

    #[test]
    fn vanity_urls_yield_nothing() {
        assert_eq!(
            extract_page_id_from_url("https://www.facebook.com/CocaCola"),
            None
        );
    }

    #[test]
    fn foreign_hosts_are_rejected() {
        assert_eq!(
            extract_page_id_from_url("https://example.com/123456"),
            None
        );
    }

    #[test]
    fn short_numeric_segments_are_ignored() {
        // Too short to be a page id.
        assert_eq!(
            extract_page_id_from_url("https://www.facebook.com/groups/42"),
            None
        );
    }

    #[test]
    fn garbage_input() {
        assert_eq!(extract_page_id_from_url(""), None);
        assert_eq!(extract_page_id_from_url("   "), None);
        assert_eq!(extract_page_id_from_url("http://"), None);
    }
}
