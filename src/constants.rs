//! Build-time constants and default configuration for the collection engine.
//!
//! Fallback token values and GraphQL document ids are process-wide read-only
//! data; when fresh values cannot be extracted from the landing page these
//! are substituted so requests can still be attempted.

use std::time::Duration;

/// Origin of the remote service.
pub const BASE_URL: &str = "https://www.facebook.com";

/// Path of the ad library landing page, relative to the origin.
pub const AD_LIBRARY_PATH: &str = "/ads/library/";

/// Path of the GraphQL endpoint, relative to the origin.
pub const GRAPHQL_PATH: &str = "/api/graphql/";

// ---------------------------------------------------------------------------
// Request defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 3;

/// Sessions older than this are refreshed before the next dispatch.
pub const MAX_SESSION_AGE: Duration = Duration::from_secs(1800);

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Base delay between successive GraphQL requests.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(2);

/// Uniform random jitter added on top of the base delay.
pub const DEFAULT_JITTER: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Results per GraphQL request. The remote caps this around 30.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

// ---------------------------------------------------------------------------
// GraphQL document ids
//
// These select precompiled queries on the remote service and drift with its
// deploys. Fresh ids are scraped from the landing page on every session
// bootstrap; the values below are last-known-good fallbacks.
// ---------------------------------------------------------------------------

/// `AdLibrarySearchPaginationQuery`
pub const DOC_ID_SEARCH: &str = "25464068859919530";

/// `useAdLibraryTypeaheadSuggestionDataSourceQuery`
pub const DOC_ID_TYPEAHEAD: &str = "9755915494515334";

pub const FRIENDLY_NAME_SEARCH: &str = "AdLibrarySearchPaginationQuery";
pub const FRIENDLY_NAME_TYPEAHEAD: &str = "useAdLibraryTypeaheadSuggestionDataSourceQuery";

// ---------------------------------------------------------------------------
// Fallback token values
// ---------------------------------------------------------------------------

pub const FALLBACK_DYN: &str = "7xeUmwlECdwn8K2Wmh0no6u5U4e1Fx-ewSAwHwNw9G2S2q0_EtxG4o0B-qbwgE1EEb87C1xwEwgo9oO0n24oaEd86a3a1YwBgao6C0Mo6i588Etw8WfK1LwPxe2GewbCXwJwmE2eUlwhE2Lw6OyES0gq0K-1LwqobU3Cwr86C1nwf6Eb87u1rwGwto461ww";

pub const FALLBACK_CSR: &str = "gjSxK8GXhkbjAmy4j8gBkiHG8FVCIJBHjpXUrByK5HxuquEyUK5Emz8Oaw9G3S5UoyUK588E4a2W0C8eEcE4S2m12wg8O1fwau1IwiEow9qE5S3KUK320g-1fDw49w2v80PS07XU0ptw2Ao05Ey02zC0aFw0hIQ00BPo06XK6k00CSo072W09xw4jw";

pub const FALLBACK_REV: &str = "1032373751";

/// `__hs` hash string observed on recent page loads.
pub const FALLBACK_HS: &str = "20476.HYP:comet_plat_default_pkg.2.1...0";

/// `__comet_req` request counter seed.
pub const FALLBACK_COMET_REQ: &str = "94";

/// API version hex used inside search variables.
pub const FALLBACK_V: &str = "fbece7";

/// Anti-abuse defense id sent as the `x-asbd-id` header.
pub const FALLBACK_ASBD_ID: &str = "359341";

// ---------------------------------------------------------------------------
// GraphQL error codes
// ---------------------------------------------------------------------------

/// Error code the remote attaches to rate-limit responses.
pub const ERROR_CODE_RATE_LIMIT: i64 = 1_675_004;

/// Error codes signalling an expired or otherwise unusable session.
pub const ERROR_CODES_SESSION: [i64; 2] = [1_357_004, 1_357_001];
