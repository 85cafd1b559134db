//! HTTP client for the ad library: session state machine, token lifecycle,
//! and the GraphQL request pipeline.
//!
//! One client owns one session: a fingerprint, a cookie jar, and a token
//! store with a creation time used for staleness. The pipeline classifies
//! every response and retries, refreshes, or propagates according to the
//! failure class; the 403 → refresh → retry path is bounded to one refresh
//! per request and `max_refresh_attempts` consecutive refresh failures
//! overall.

pub mod payload;
pub mod response;
pub mod tokens;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use rand::Rng;
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Proxy, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::constants::{
    AD_LIBRARY_PATH, BASE_URL, DEFAULT_MAX_REFRESH_ATTEMPTS, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT, DOC_ID_SEARCH, DOC_ID_TYPEAHEAD, FALLBACK_ASBD_ID,
    FALLBACK_V, FRIENDLY_NAME_SEARCH, FRIENDLY_NAME_TYPEAHEAD, GRAPHQL_PATH, MAX_SESSION_AGE,
};
use crate::error::{AdLibraryError, Result};
use crate::events::{EventEmitter, EventType};
use crate::fingerprint::Fingerprint;
use crate::models::{AdStatus, AdType, MediaType, PageSearchResult, SearchType, SortMode};
use crate::normalize::normalize_page_result;
use crate::proxy::{parse_endpoint, ProxyPool};

use self::payload::build_payload;
use self::response::{classify_body, parse_search_page, parse_typeahead_suggestions, GraphqlOutcome};
use self::tokens::{extract_doc_ids, generate_datr, DocIds, TokenStore};

/// Marker the verification challenge page embeds in its script payload.
const CHALLENGE_MARKER: &str = "/__rd_verify_";

static CHALLENGE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"fetch\('(/__rd_verify_[^']+)'").expect("challenge pattern"));

/// Proxy selection supplied at construction.
#[derive(Debug, Clone, Default)]
pub enum ProxyConfig {
    /// Direct connections.
    #[default]
    Direct,
    /// One fixed endpoint.
    Single(String),
    /// Rotate through a shared pool.
    Pool(Arc<ProxyPool>),
}

impl ProxyConfig {
    /// A single endpoint in any accepted grammar.
    pub fn single(raw: &str) -> Result<Self> {
        Ok(Self::Single(parse_endpoint(raw)?))
    }

    /// A pool built from a list of endpoint strings.
    pub fn list<S: AsRef<str>>(raws: &[S]) -> Result<Self> {
        Ok(Self::Pool(Arc::new(ProxyPool::new(raws)?)))
    }

    /// Share an existing pool.
    pub fn pool(pool: Arc<ProxyPool>) -> Self {
        Self::Pool(pool)
    }
}

/// Client construction options.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub proxy: ProxyConfig,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_refresh_attempts: u32,
    /// Origin of the remote service. Overridable so the test harness can
    /// point the client at a local mock.
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::Direct,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
            base_url: BASE_URL.to_string(),
        }
    }
}

/// Explicit bootstrap states. The challenge round runs at most once; a
/// challenge that does not resolve fails initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BootstrapState {
    Uninitialized,
    Challenge,
    Extract,
    Ready,
}

/// One search request against the ad library.
#[derive(Debug, Clone)]
pub struct AdSearchQuery<'a> {
    pub query: &'a str,
    pub country: &'a str,
    pub ad_type: AdType,
    pub status: AdStatus,
    pub media_type: MediaType,
    pub search_type: SearchType,
    pub page_ids: &'a [String],
    pub cursor: Option<&'a str>,
    pub first: u32,
    pub sort: SortMode,
    /// Search session id, reused across the pages of one search.
    pub session_id: &'a str,
    /// Collation token, reused across the pages of one search.
    pub collation_token: &'a str,
}

/// HTTP client bound to one session of the ad library.
pub struct AdLibraryClient {
    config: ClientConfig,
    fingerprint: Fingerprint,
    jar: Arc<Jar>,
    http_cache: HashMap<Option<String>, reqwest::Client>,
    tokens: TokenStore,
    doc_ids: DocIds,
    ready: bool,
    created_at: Option<Instant>,
    request_counter: u64,
    consecutive_errors: u32,
    consecutive_refresh_failures: u32,
    emitter: Option<Arc<EventEmitter>>,
}

impl AdLibraryClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            fingerprint: Fingerprint::generate(),
            jar: Arc::new(Jar::default()),
            http_cache: HashMap::new(),
            tokens: TokenStore::default(),
            doc_ids: DocIds::default(),
            ready: false,
            created_at: None,
            request_counter: 0,
            consecutive_errors: 0,
            consecutive_refresh_failures: 0,
            emitter: None,
        }
    }

    /// Attach the collector's event emitter so the pipeline can surface
    /// `rate_limited` and `session_refreshed` events.
    pub fn set_emitter(&mut self, emitter: Arc<EventEmitter>) {
        self.emitter = Some(emitter);
    }

    pub fn is_initialized(&self) -> bool {
        self.ready
    }

    fn emit(&self, event_type: EventType, data: Value) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event_type, data);
        }
    }

    // -- URLs ---------------------------------------------------------------

    fn origin(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn library_url(&self) -> String {
        format!("{}{}", self.origin(), AD_LIBRARY_PATH)
    }

    fn graphql_url(&self) -> String {
        format!("{}{}", self.origin(), GRAPHQL_PATH)
    }

    // -- HTTP plumbing ------------------------------------------------------

    /// Clients are cached per proxy endpoint; they all share the session's
    /// cookie jar, so rotation never loses cookies.
    fn http_client(&mut self, proxy: Option<&str>) -> Result<reqwest::Client> {
        let key = proxy.map(str::to_string);
        if let Some(client) = self.http_cache.get(&key) {
            return Ok(client.clone());
        }
        let mut builder = reqwest::Client::builder()
            .user_agent(&self.fingerprint.user_agent)
            .timeout(self.config.timeout)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_provider(Arc::clone(&self.jar));
        if let Some(endpoint) = proxy {
            builder = builder.proxy(Proxy::all(endpoint)?);
        }
        let client = builder.build()?;
        self.http_cache.insert(key, client.clone());
        Ok(client)
    }

    fn pick_proxy(&self) -> Result<Option<String>> {
        match &self.config.proxy {
            ProxyConfig::Direct => Ok(None),
            ProxyConfig::Single(endpoint) => Ok(Some(endpoint.clone())),
            ProxyConfig::Pool(pool) => Ok(Some(pool.next()?)),
        }
    }

    fn note_proxy_success(&self, proxy: &Option<String>) {
        if let (ProxyConfig::Pool(pool), Some(endpoint)) = (&self.config.proxy, proxy) {
            pool.mark_success(endpoint);
        }
    }

    fn note_proxy_failure(&self, proxy: &Option<String>) {
        if let (ProxyConfig::Pool(pool), Some(endpoint)) = (&self.config.proxy, proxy) {
            pool.mark_failure(endpoint);
        }
    }

    /// Exponential backoff with uniform jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        Duration::from_secs_f64(base + jitter)
    }

    fn header_map(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    map.insert(HeaderName::from_static(*name), v);
                }
                Err(_) => warn!(header = *name, "skipping invalid header value"),
            }
        }
        map
    }

    /// Issue one request with network-level retries and proxy rotation.
    /// Rate limits and server errors back off and retry; any other
    /// response is returned to the caller for interpretation.
    async fn fetch_with_retries(
        &mut self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<reqwest::Response> {
        let max = self.config.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            let proxy = self.pick_proxy()?;
            let client = self.http_client(proxy.as_deref())?;
            let mut request = client.request(method.clone(), url).headers(headers.clone());
            if !query.is_empty() {
                request = request.query(query);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    self.note_proxy_failure(&proxy);
                    attempt += 1;
                    if attempt >= max {
                        return Err(e.into());
                    }
                    let delay = self.backoff_delay(attempt - 1);
                    warn!(url, attempt, error = %e, "request failed, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_header(&response)
                    .unwrap_or_else(|| self.backoff_delay(attempt));
                attempt += 1;
                self.emit(
                    EventType::RateLimited,
                    json!({"wait_seconds": retry_after.as_secs_f64(), "attempt": attempt}),
                );
                if attempt >= max {
                    return Err(AdLibraryError::RateLimited { retry_after });
                }
                warn!(url, "rate limited, waiting {retry_after:?} before retry");
                tokio::time::sleep(retry_after).await;
                continue;
            }
            if status.is_server_error() {
                self.note_proxy_failure(&proxy);
                attempt += 1;
                if attempt >= max {
                    return Err(AdLibraryError::Network {
                        message: format!("HTTP {status} after {attempt} attempts"),
                        source: None,
                    });
                }
                let delay = self.backoff_delay(attempt - 1);
                tokio::time::sleep(delay).await;
                continue;
            }

            self.note_proxy_success(&proxy);
            return Ok(response);
        }
    }

    // -- Bootstrap ----------------------------------------------------------

    /// Synthetic first-party cookies the remote expects on first contact.
    fn seed_cookies(&self) {
        let Ok(url) = reqwest::Url::parse(&self.config.base_url) else {
            return;
        };
        let datr = generate_datr();
        debug!(datr_prefix = &datr[..8], "seeding session cookies");
        self.jar
            .add_cookie_str(&format!("datr={datr}; Path=/"), &url);
        self.jar.add_cookie_str(
            &format!("wd={}; Path=/", self.fingerprint.viewport_cookie()),
            &url,
        );
        self.jar
            .add_cookie_str(&format!("dpr={}; Path=/", self.fingerprint.dpr), &url);
    }

    async fn fetch_landing(&mut self, after_challenge: bool) -> Result<reqwest::Response> {
        let mut pairs = self.fingerprint.navigation_headers();
        if after_challenge {
            for (name, value) in &mut pairs {
                if *name == "sec-fetch-site" {
                    *value = "same-origin".to_string();
                }
            }
            pairs.push(("referer", format!("{}/", self.origin())));
        }
        let headers = Self::header_map(&pairs);
        let url = self.library_url();
        self.fetch_with_retries(
            Method::GET,
            &url,
            &[
                ("active_status", "active"),
                ("ad_type", "all"),
                ("country", "US"),
                ("media_type", "all"),
            ],
            headers,
        )
        .await
    }

    /// POST the challenge endpoint encoded in the verification page.
    ///
    /// TODO: only the `/__rd_verify_` marker is recognized; other challenge
    /// variants observed in the wild need their own handlers before they
    /// can resolve.
    async fn solve_challenge(&mut self, body: &str) -> Result<()> {
        let Some(caps) = CHALLENGE_URL_RE.captures(body) else {
            return Err(AdLibraryError::Authentication(
                "challenge page without a recognizable verification URL".into(),
            ));
        };
        let challenge_url = format!("{}{}", self.origin(), &caps[1]);
        info!(path = &caps[1], "handling verification challenge");

        // Real browsers send this fetch with no body and no content-type.
        let pairs = vec![
            ("accept", "*/*".to_string()),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            ("origin", self.origin().to_string()),
            ("referer", self.library_url()),
            ("sec-ch-ua", self.fingerprint.sec_ch_ua.clone()),
            (
                "sec-ch-ua-mobile",
                self.fingerprint.sec_ch_ua_mobile.to_string(),
            ),
            (
                "sec-ch-ua-platform",
                self.fingerprint.sec_ch_ua_platform.to_string(),
            ),
            ("sec-fetch-dest", "empty".to_string()),
            ("sec-fetch-mode", "cors".to_string()),
            ("sec-fetch-site", "same-origin".to_string()),
            ("user-agent", self.fingerprint.user_agent.clone()),
        ];
        let headers = Self::header_map(&pairs);
        let response = self
            .fetch_with_retries(Method::POST, &challenge_url, &[], headers)
            .await?;
        debug!(status = %response.status(), "challenge response");
        Ok(())
    }

    /// Load the landing page and extract tokens, walking the bootstrap
    /// state machine: Uninitialized → (Challenge)? → Extract → Ready.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("initializing ad library client");
        match self.bootstrap().await {
            Ok(()) => Ok(()),
            Err(e @ AdLibraryError::Authentication(_)) => Err(e),
            Err(e @ AdLibraryError::SessionExpired(_)) => Err(e),
            Err(e) => Err(AdLibraryError::Authentication(format!(
                "failed to initialize client: {e}"
            ))),
        }
    }

    async fn bootstrap(&mut self) -> Result<()> {
        let mut state = BootstrapState::Uninitialized;
        let mut body = String::new();
        loop {
            state = match state {
                BootstrapState::Uninitialized => {
                    self.seed_cookies();
                    let response = self.fetch_landing(false).await?;
                    let status = response.status();
                    body = response.text().await?;
                    if status == StatusCode::FORBIDDEN || body.contains(CHALLENGE_MARKER) {
                        BootstrapState::Challenge
                    } else if !status.is_success() {
                        return Err(AdLibraryError::Authentication(format!(
                            "failed to load landing page (HTTP {status})"
                        )));
                    } else {
                        BootstrapState::Extract
                    }
                }
                BootstrapState::Challenge => {
                    // Exactly one challenge round; a challenge that does
                    // not resolve fails the bootstrap.
                    self.solve_challenge(&body).await?;
                    tokio::time::sleep(Duration::from_millis(1500)).await;
                    let response = self.fetch_landing(true).await?;
                    let status = response.status();
                    body = response.text().await?;
                    if status == StatusCode::FORBIDDEN || body.contains(CHALLENGE_MARKER) {
                        return Err(AdLibraryError::Authentication(
                            "verification challenge did not resolve".into(),
                        ));
                    }
                    if !status.is_success() {
                        return Err(AdLibraryError::Authentication(format!(
                            "failed to load landing page after challenge (HTTP {status})"
                        )));
                    }
                    BootstrapState::Extract
                }
                BootstrapState::Extract => {
                    self.tokens = TokenStore::extract(&body);
                    self.doc_ids = extract_doc_ids(&body);
                    if self.tokens.lsd().is_none() {
                        return Err(AdLibraryError::Authentication(
                            "could not extract lsd token from landing page".into(),
                        ));
                    }
                    self.tokens.fill_fallbacks();
                    BootstrapState::Ready
                }
                BootstrapState::Ready => {
                    self.ready = true;
                    self.created_at = Some(Instant::now());
                    self.consecutive_errors = 0;
                    info!("client initialized");
                    // A short human-jitter pause before the first GraphQL
                    // call.
                    let pause = rand::thread_rng().gen_range(1.5..3.0);
                    tokio::time::sleep(Duration::from_secs_f64(pause)).await;
                    return Ok(());
                }
            };
        }
    }

    // -- Session lifecycle --------------------------------------------------

    fn is_stale(&self) -> bool {
        self.created_at
            .map_or(true, |created| created.elapsed() > MAX_SESSION_AGE)
    }

    fn reset_session_state(&mut self) {
        self.fingerprint = Fingerprint::generate();
        self.jar = Arc::new(Jar::default());
        self.http_cache.clear();
        self.tokens = TokenStore::default();
        self.doc_ids = DocIds::default();
        self.ready = false;
        self.created_at = None;
        self.request_counter = 0;
        self.consecutive_errors = 0;
    }

    /// Tear down the session and bootstrap a fresh one. Consecutive
    /// failures are bounded by `max_refresh_attempts`; beyond that the
    /// session is declared expired.
    pub async fn refresh_session(&mut self, reason: &str) -> Result<()> {
        if self.consecutive_refresh_failures >= self.config.max_refresh_attempts {
            return Err(AdLibraryError::SessionExpired(format!(
                "session refresh failed {} consecutive times (max {})",
                self.consecutive_refresh_failures, self.config.max_refresh_attempts
            )));
        }

        info!(reason, "refreshing session");
        self.reset_session_state();
        match self.initialize().await {
            Ok(()) => {
                self.consecutive_refresh_failures = 0;
                self.emit(EventType::SessionRefreshed, json!({ "reason": reason }));
                Ok(())
            }
            Err(e) => {
                self.consecutive_refresh_failures += 1;
                warn!(
                    failures = self.consecutive_refresh_failures,
                    max = self.config.max_refresh_attempts,
                    "session refresh failed"
                );
                Err(e)
            }
        }
    }

    /// Initialize lazily and refresh proactively when the session has
    /// outlived `MAX_SESSION_AGE`.
    async fn ensure_ready(&mut self) -> Result<()> {
        if !self.ready {
            self.initialize().await
        } else if self.is_stale() {
            info!("session is stale, refreshing before request");
            self.refresh_session("stale_session").await
        } else {
            Ok(())
        }
    }

    // -- GraphQL pipeline ---------------------------------------------------

    fn next_request_id(&mut self) -> u64 {
        self.request_counter += 1;
        self.request_counter
    }

    fn graphql_headers(&self, friendly_name: &str, referer: &str) -> HeaderMap {
        let mut pairs = self.fingerprint.graphql_headers(self.origin());
        pairs.push(("x-fb-friendly-name", friendly_name.to_string()));
        pairs.push((
            "x-fb-lsd",
            self.tokens.lsd().unwrap_or_default().to_string(),
        ));
        pairs.push((
            "x-asbd-id",
            self.tokens.get_or("x-asbd-id", FALLBACK_ASBD_ID).to_string(),
        ));
        pairs.push(("referer", referer.to_string()));
        Self::header_map(&pairs)
    }

    /// Dispatch one GraphQL document with the full outcome classification:
    /// success, rate limit (header or body marker), 403/session refresh,
    /// server error, or protocol error.
    async fn graphql_request(
        &mut self,
        doc_id: &str,
        friendly_name: &str,
        variables: &Value,
        referer: &str,
    ) -> Result<Value> {
        let max = self.config.max_retries.max(1);
        let mut attempt = 0u32;
        let mut refreshed = false;

        loop {
            let request_id = self.next_request_id();
            let payload =
                build_payload(&self.tokens, doc_id, variables, friendly_name, request_id);
            let headers = self.graphql_headers(friendly_name, referer);

            let proxy = self.pick_proxy()?;
            let client = self.http_client(proxy.as_deref())?;
            let url = self.graphql_url();

            let result = client
                .post(&url)
                .headers(headers)
                .form(&payload)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    self.note_proxy_failure(&proxy);
                    attempt += 1;
                    if attempt >= max {
                        return Err(e.into());
                    }
                    let delay = self.backoff_delay(attempt - 1);
                    warn!(attempt, error = %e, "graphql request failed, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::FORBIDDEN {
                if refreshed {
                    return Err(AdLibraryError::Authentication(
                        "graphql request rejected (403) after session refresh".into(),
                    ));
                }
                warn!("got 403 on graphql request, session likely expired");
                self.refresh_session("graphql_403").await?;
                refreshed = true;
                // The refresh consumes one attempt against max_retries.
                attempt += 1;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_header(&response)
                    .unwrap_or_else(|| self.backoff_delay(attempt));
                attempt += 1;
                self.emit(
                    EventType::RateLimited,
                    json!({"wait_seconds": retry_after.as_secs_f64(), "attempt": attempt}),
                );
                if attempt >= max {
                    return Err(AdLibraryError::RateLimited { retry_after });
                }
                warn!("rate limited (HTTP 429), waiting {retry_after:?} before retry");
                tokio::time::sleep(retry_after).await;
                continue;
            }

            if status.is_server_error() {
                self.note_proxy_failure(&proxy);
                attempt += 1;
                if attempt >= max {
                    return Err(AdLibraryError::Network {
                        message: format!("HTTP {status} after {attempt} attempts"),
                        source: None,
                    });
                }
                let delay = self.backoff_delay(attempt - 1);
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(AdLibraryError::protocol(
                    format!("graphql request failed with status {status}"),
                    body,
                ));
            }

            match classify_body(&body)? {
                GraphqlOutcome::Data(data) => {
                    self.note_proxy_success(&proxy);
                    self.consecutive_errors = 0;
                    self.consecutive_refresh_failures = 0;
                    return Ok(data);
                }
                GraphqlOutcome::RateLimited { message } => {
                    let retry_after = self.backoff_delay(attempt);
                    attempt += 1;
                    self.emit(
                        EventType::RateLimited,
                        json!({"wait_seconds": retry_after.as_secs_f64(), "attempt": attempt}),
                    );
                    if attempt >= max {
                        return Err(AdLibraryError::RateLimited { retry_after });
                    }
                    warn!(message, "rate limit marker in response, waiting {retry_after:?}");
                    tokio::time::sleep(retry_after).await;
                    continue;
                }
                GraphqlOutcome::SessionError { message } => {
                    self.consecutive_errors += 1;
                    if refreshed {
                        return Err(AdLibraryError::Authentication(format!(
                            "session error after refresh: {message}"
                        )));
                    }
                    warn!(message, "session error in response, refreshing");
                    self.refresh_session("session_error").await?;
                    refreshed = true;
                    attempt += 1;
                    continue;
                }
            }
        }
    }

    // -- Public operations --------------------------------------------------

    /// Fetch one page of search results.
    pub async fn search_ads(&mut self, query: &AdSearchQuery<'_>) -> Result<response::SearchPage> {
        self.ensure_ready().await?;

        let mut variables = json!({
            "activeStatus": query.status.as_str(),
            "adType": query.ad_type.as_str(),
            "bylines": [],
            "collationToken": query.collation_token,
            "contentLanguages": [],
            "countries": [query.country],
            "excludedIDs": [],
            "first": query.first,
            "isTargetedCountry": false,
            "location": null,
            "mediaType": query.media_type.as_str(),
            "multiCountryFilterMode": null,
            "pageIDs": query.page_ids,
            "potentialReachInput": [],
            "publisherPlatforms": [],
            "queryString": query.query,
            "regions": [],
            "searchType": query.search_type.as_str(),
            "sessionID": query.session_id,
            "source": null,
            "startDate": null,
            "v": self.tokens.get_or("v", FALLBACK_V),
            "viewAllPageID": "0",
        });
        // Only the impression sort has a wire form; anything else makes the
        // variables object noncoercible, so relevancy omits sortData.
        if let Some(mode) = query.sort.wire_value() {
            variables["sortData"] = json!({"direction": "DESCENDING", "mode": mode});
        }
        if let Some(cursor) = query.cursor {
            variables["cursor"] = json!(cursor);
        }

        let doc_id = self
            .doc_ids
            .search
            .clone()
            .unwrap_or_else(|| DOC_ID_SEARCH.to_string());
        let referer = format!(
            "{}?active_status={}&ad_type={}&country={}&q={}",
            self.library_url(),
            query.status.as_str().to_lowercase(),
            query.ad_type.as_url_param(),
            query.country,
            urlencode(query.query),
        );

        let data = self
            .graphql_request(&doc_id, FRIENDLY_NAME_SEARCH, &variables, &referer)
            .await?;
        Ok(parse_search_page(&data))
    }

    /// Search for pages by name via the typeahead document.
    pub async fn search_pages(
        &mut self,
        query: &str,
        country: &str,
    ) -> Result<Vec<PageSearchResult>> {
        self.ensure_ready().await?;

        let variables = json!({
            "queryString": query,
            "country": country,
            "adType": "ALL",
            "isMobile": false,
        });
        let doc_id = self
            .doc_ids
            .typeahead
            .clone()
            .unwrap_or_else(|| DOC_ID_TYPEAHEAD.to_string());
        let referer = format!(
            "{}?active_status=all&ad_type=all&country={}&q={}",
            self.library_url(),
            country,
            urlencode(query),
        );

        let data = self
            .graphql_request(&doc_id, FRIENDLY_NAME_TYPEAHEAD, &variables, &referer)
            .await?;
        let pages = parse_typeahead_suggestions(&data)
            .iter()
            .filter_map(normalize_page_result)
            .collect::<Vec<_>>();
        debug!(count = pages.len(), "typeahead pages parsed");
        Ok(pages)
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_refresh_attempts, 3);
        assert_eq!(config.base_url, BASE_URL);
    }

    #[test]
    fn proxy_config_construction() {
        assert!(matches!(
            ProxyConfig::single("1.2.3.4:8080").unwrap(),
            ProxyConfig::Single(url) if url == "http://1.2.3.4:8080"
        ));
        assert!(ProxyConfig::single("garbage").is_err());
        assert!(matches!(
            ProxyConfig::list(&["1.2.3.4:8080", "5.6.7.8:8080"]).unwrap(),
            ProxyConfig::Pool(_)
        ));
    }

    #[test]
    fn fresh_client_is_stale_and_uninitialized() {
        let client = AdLibraryClient::new(ClientConfig::default());
        assert!(!client.is_initialized());
        assert!(client.is_stale());
    }

    #[test]
    fn urlencode_spaces_and_symbols() {
        assert_eq!(urlencode("coca cola"), "coca+cola");
        assert_eq!(urlencode("a&b"), "a%26b");
    }
}
