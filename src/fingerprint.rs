//! Browser fingerprint generation.
//!
//! Produces a randomized but internally-consistent identity bundle for one
//! session lifetime: the Chrome version in the User-Agent always matches the
//! version in `sec-ch-ua`, and the platform in the UA matches
//! `sec-ch-ua-platform`.

use rand::seq::SliceRandom;
use tracing::debug;

/// Recent Chrome releases: (major version, full version).
const CHROME_VERSIONS: &[(&str, &str)] = &[
    ("125", "125.0.6422.113"),
    ("126", "126.0.6478.127"),
    ("127", "127.0.6533.100"),
    ("128", "128.0.6613.120"),
    ("129", "129.0.6668.90"),
    ("130", "130.0.6723.117"),
    ("131", "131.0.6778.140"),
    ("132", "132.0.6834.83"),
];

struct Platform {
    name: &'static str,
    ua_os: &'static str,
    sec_ch_ua_platform: &'static str,
    platform_version: &'static str,
}

const PLATFORMS: &[Platform] = &[
    Platform {
        name: "windows",
        ua_os: "Windows NT 10.0; Win64; x64",
        sec_ch_ua_platform: "\"Windows\"",
        platform_version: "\"15.0.0\"",
    },
    Platform {
        name: "macos",
        ua_os: "Macintosh; Intel Mac OS X 10_15_7",
        sec_ch_ua_platform: "\"macOS\"",
        platform_version: "\"14.5.0\"",
    },
    Platform {
        name: "macos",
        ua_os: "Macintosh; Intel Mac OS X 10_15_7",
        sec_ch_ua_platform: "\"macOS\"",
        platform_version: "\"13.6.0\"",
    },
    Platform {
        name: "windows",
        ua_os: "Windows NT 10.0; Win64; x64",
        sec_ch_ua_platform: "\"Windows\"",
        platform_version: "\"10.0.0\"",
    },
];

const VIEWPORTS: &[(u32, u32)] = &[
    (1366, 768),
    (1440, 900),
    (1536, 864),
    (1920, 1080),
    (2560, 1440),
    (1680, 1050),
    (1280, 720),
    (1600, 900),
];

const DPR_VALUES: &[&str] = &["1", "1.25", "1.5", "2", "3"];

/// "Not a Brand" client-hint variants observed in the wild.
const NOT_A_BRAND_HINTS: &[(&str, &str)] = &[
    ("Not_A Brand", "24"),
    ("Not/A)Brand", "8"),
    ("Not.A/Brand", "8"),
    ("Not A(Brand", "99"),
];

/// A consistent browser fingerprint for one session.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub user_agent: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_full_version_list: String,
    pub sec_ch_ua_platform: &'static str,
    pub sec_ch_ua_platform_version: &'static str,
    pub sec_ch_ua_mobile: &'static str,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub dpr: &'static str,
    pub platform_name: &'static str,
    pub chrome_major: &'static str,
    pub chrome_full: &'static str,
}

impl Fingerprint {
    /// Generate a randomized fingerprint with cross-consistent fields.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();

        let &(chrome_major, chrome_full) = CHROME_VERSIONS.choose(&mut rng).unwrap();
        let platform = PLATFORMS.choose(&mut rng).unwrap();
        let &(viewport_width, viewport_height) = VIEWPORTS.choose(&mut rng).unwrap();
        let &dpr = DPR_VALUES.choose(&mut rng).unwrap();
        let &(nab_name, nab_version) = NOT_A_BRAND_HINTS.choose(&mut rng).unwrap();

        let user_agent = format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
            platform.ua_os, chrome_major,
        );

        let sec_ch_ua = format!(
            "\"Google Chrome\";v=\"{major}\", \"Chromium\";v=\"{major}\", \"{nab}\";v=\"{nabv}\"",
            major = chrome_major,
            nab = nab_name,
            nabv = nab_version,
        );

        let sec_ch_ua_full_version_list = format!(
            "\"Google Chrome\";v=\"{full}\", \"Chromium\";v=\"{full}\", \"{nab}\";v=\"{nabv}.0.0.0\"",
            full = chrome_full,
            nab = nab_name,
            nabv = nab_version,
        );

        debug!(
            chrome = chrome_major,
            platform = platform.name,
            viewport = format!("{}x{}", viewport_width, viewport_height),
            dpr,
            "generated session fingerprint"
        );

        Self {
            user_agent,
            sec_ch_ua,
            sec_ch_ua_full_version_list,
            sec_ch_ua_platform: platform.sec_ch_ua_platform,
            sec_ch_ua_platform_version: platform.platform_version,
            sec_ch_ua_mobile: "?0",
            viewport_width,
            viewport_height,
            dpr,
            platform_name: platform.name,
            chrome_major,
            chrome_full,
        }
    }

    /// Headers for a page-load (navigation) request.
    pub fn navigation_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
                 image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"
                    .to_string(),
            ),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            ("cache-control", "max-age=0".to_string()),
            ("dpr", self.dpr.to_string()),
            ("sec-ch-prefers-color-scheme", "light".to_string()),
            ("sec-ch-ua", self.sec_ch_ua.clone()),
            (
                "sec-ch-ua-full-version-list",
                self.sec_ch_ua_full_version_list.clone(),
            ),
            ("sec-ch-ua-mobile", self.sec_ch_ua_mobile.to_string()),
            ("sec-ch-ua-model", "\"\"".to_string()),
            ("sec-ch-ua-platform", self.sec_ch_ua_platform.to_string()),
            (
                "sec-ch-ua-platform-version",
                self.sec_ch_ua_platform_version.to_string(),
            ),
            ("sec-fetch-dest", "document".to_string()),
            ("sec-fetch-mode", "navigate".to_string()),
            ("sec-fetch-site", "none".to_string()),
            ("sec-fetch-user", "?1".to_string()),
            ("upgrade-insecure-requests", "1".to_string()),
            ("user-agent", self.user_agent.clone()),
            ("viewport-width", self.viewport_width.to_string()),
        ]
    }

    /// Headers for a GraphQL XHR request.
    pub fn graphql_headers(&self, origin: &str) -> Vec<(&'static str, String)> {
        vec![
            ("accept", "*/*".to_string()),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            (
                "content-type",
                "application/x-www-form-urlencoded".to_string(),
            ),
            ("origin", origin.to_string()),
            ("sec-ch-prefers-color-scheme", "light".to_string()),
            ("sec-ch-ua", self.sec_ch_ua.clone()),
            ("sec-ch-ua-mobile", self.sec_ch_ua_mobile.to_string()),
            ("sec-ch-ua-platform", self.sec_ch_ua_platform.to_string()),
            (
                "sec-ch-ua-platform-version",
                self.sec_ch_ua_platform_version.to_string(),
            ),
            ("sec-fetch-dest", "empty".to_string()),
            ("sec-fetch-mode", "cors".to_string()),
            ("sec-fetch-site", "same-origin".to_string()),
            ("user-agent", self.user_agent.clone()),
        ]
    }

    /// The `wd` cookie value (viewport `WxH`).
    pub fn viewport_cookie(&self) -> String {
        format!("{}x{}", self.viewport_width, self.viewport_height)
    }
}
