//! High-level collector: parameter validation, cursor-paginated streaming,
//! deduplication, filtering, and lifecycle events.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{AdLibraryClient, AdSearchQuery, ClientConfig, ProxyConfig};
use crate::constants::{
    DEFAULT_JITTER, DEFAULT_MAX_REFRESH_ATTEMPTS, DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE,
    DEFAULT_RATE_LIMIT_DELAY, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT,
};
use crate::dedup::SharedDedup;
use crate::error::{AdLibraryError, Result};
use crate::events::{EventEmitter, EventType, Listener, ListenerId};
use crate::filters::FilterConfig;
use crate::models::{Ad, AdStatus, AdType, MediaType, PageSearchResult, SearchType, SortMode};
use crate::normalize::normalize_ad;
use crate::url_parser::extract_page_id_from_url;

/// Collector construction options.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub proxy: ProxyConfig,
    /// Base delay between successive page requests.
    pub rate_limit_delay: Duration,
    /// Uniform random jitter added to the base delay.
    pub jitter: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_refresh_attempts: u32,
    pub page_size: u32,
    /// Origin of the remote service; overridable for the test harness.
    pub base_url: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            proxy: ProxyConfig::Direct,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            jitter: DEFAULT_JITTER,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
            page_size: DEFAULT_PAGE_SIZE,
            base_url: crate::constants::BASE_URL.to_string(),
        }
    }
}

/// Parameters for one search.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub country: String,
    pub ad_type: AdType,
    pub status: AdStatus,
    pub media_type: MediaType,
    pub search_type: SearchType,
    pub page_ids: Vec<String>,
    pub sort: SortMode,
    pub max_results: Option<u64>,
    /// Overrides the collector's configured page size when set.
    pub page_size: Option<u32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            country: "US".to_string(),
            ad_type: AdType::All,
            status: AdStatus::Active,
            media_type: MediaType::All,
            search_type: SearchType::KeywordExactPhrase,
            page_ids: Vec::new(),
            sort: SortMode::TotalImpressions,
            max_results: None,
            page_size: None,
        }
    }
}

impl SearchParams {
    /// Normalize and validate the parameter set.
    fn validate(&mut self) -> Result<()> {
        self.country = self.country.to_uppercase();
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AdLibraryError::InvalidParameter {
                field: "country",
                value: self.country.clone(),
                allowed: "a 2-letter ISO 3166-1 alpha-2 code (e.g. 'US', 'EG')".to_string(),
            });
        }
        Ok(())
    }
}

/// Collection statistics for the current collector instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectorStats {
    pub requests_made: u64,
    pub ads_collected: u64,
    pub pages_fetched: u64,
    pub errors: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CollectorStats {
    /// Wall-clock duration of the last collection, when finished.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// High-level collector for the ad library.
///
/// Owns the client (session + pipeline) and the event emitter; borrows the
/// dedup tracker and filter configuration supplied at construction.
pub struct AdCollector {
    client: AdLibraryClient,
    emitter: Arc<EventEmitter>,
    config: CollectorConfig,
    dedup: Option<SharedDedup>,
    filter: Option<FilterConfig>,
    stats: CollectorStats,
}

impl AdCollector {
    pub fn new(config: CollectorConfig) -> Self {
        let client_config = ClientConfig {
            proxy: config.proxy.clone(),
            timeout: config.timeout,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            max_refresh_attempts: config.max_refresh_attempts,
            base_url: config.base_url.clone(),
        };
        let emitter = Arc::new(EventEmitter::new());
        let mut client = AdLibraryClient::new(client_config);
        client.set_emitter(Arc::clone(&emitter));

        Self {
            client,
            emitter,
            config,
            dedup: None,
            filter: None,
            stats: CollectorStats::default(),
        }
    }

    /// Attach a dedup tracker; already-seen ads are skipped.
    pub fn with_dedup(mut self, dedup: SharedDedup) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Attach a client-side filter applied to every record.
    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Register a batch of lifecycle listeners at construction time.
    pub fn with_callbacks<I>(self, callbacks: I) -> Self
    where
        I: IntoIterator<Item = (EventType, Listener)>,
    {
        for (event_type, listener) in callbacks {
            self.emitter.on(event_type, listener);
        }
        self
    }

    /// Register a lifecycle listener.
    pub fn on_event(&self, event_type: EventType, listener: Listener) -> ListenerId {
        self.emitter.on(event_type, listener)
    }

    /// Shared handle to the emitter, e.g. for the webhook forwarder.
    pub fn emitter(&self) -> Arc<EventEmitter> {
        Arc::clone(&self.emitter)
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats.clone()
    }

    /// Search for ads, returning a lazy stream of normalized records.
    pub async fn search(&mut self, mut params: SearchParams) -> Result<AdStream<'_>> {
        params.validate()?;

        info!(
            query = params.query,
            country = params.country,
            ad_type = params.ad_type.as_str(),
            "starting search"
        );

        self.stats.start_time = Some(Utc::now());
        self.stats.end_time = None;

        self.emitter.emit(
            EventType::CollectionStarted,
            json!({
                "query": params.query,
                "country": params.country,
                "ad_type": params.ad_type.as_str(),
                "status": params.status.as_str(),
                "search_type": params.search_type.as_str(),
                "page_ids": params.page_ids,
                "max_results": params.max_results,
            }),
        );

        Ok(AdStream {
            collector: self,
            params,
            session_id: Uuid::new_v4().to_string(),
            collation_token: Uuid::new_v4().to_string(),
            cursor: None,
            state: StreamState::Fetch,
            buffer: VecDeque::new(),
            has_next: false,
            page_number: 0,
            collected: 0,
            started: Instant::now(),
            first_page: true,
        })
    }

    /// Search and drain every result into a vector.
    pub async fn collect(&mut self, params: SearchParams) -> Result<Vec<Ad>> {
        let stream = self.search(params).await?;
        stream.drain().await
    }

    /// Search for pages by name via the typeahead endpoint.
    pub async fn search_pages(
        &mut self,
        query: &str,
        country: &str,
    ) -> Result<Vec<PageSearchResult>> {
        self.client.search_pages(query, country).await
    }

    /// Collect ads run by a specific page, by numeric page id.
    pub async fn search_by_page_id(
        &mut self,
        page_id: &str,
        mut params: SearchParams,
    ) -> Result<AdStream<'_>> {
        params.search_type = SearchType::Page;
        params.page_ids = vec![page_id.to_string()];
        self.search(params).await
    }

    /// Collect ads run by the page a URL points at. Vanity URLs cannot be
    /// resolved without a network call and are rejected; resolve them with
    /// [`AdCollector::search_pages`] first.
    pub async fn search_by_page_url(
        &mut self,
        url: &str,
        params: SearchParams,
    ) -> Result<AdStream<'_>> {
        let Some(page_id) = extract_page_id_from_url(url) else {
            return Err(AdLibraryError::InvalidParameter {
                field: "page_url",
                value: url.to_string(),
                allowed: "a URL carrying a numeric page id (vanity URLs need \
                          search_pages resolution first)"
                    .to_string(),
            });
        };
        self.search_by_page_id(&page_id, params).await
    }

    /// Resolve a page name through the typeahead endpoint (first match
    /// wins), then collect that page's ads.
    pub async fn search_by_page_name(
        &mut self,
        page_name: &str,
        params: SearchParams,
    ) -> Result<AdStream<'_>> {
        let pages = self.search_pages(page_name, &params.country).await?;
        let Some(best) = pages.first() else {
            return Err(AdLibraryError::InvalidParameter {
                field: "page_name",
                value: page_name.to_string(),
                allowed: "a page name the typeahead endpoint can resolve".to_string(),
            });
        };
        info!(
            page_name,
            page_id = best.page_id,
            resolved = best.page_name,
            "resolved page name"
        );
        let page_id = best.page_id.clone();
        self.search_by_page_id(&page_id, params).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    /// Request the next page from the pipeline.
    Fetch,
    /// Yield records from the buffered page.
    Drain,
    /// Terminal; `collection_finished` has been emitted.
    Done,
}

/// Lazy stream of normalized ad records.
///
/// Advances on the caller's task; suspends at page fetches and the
/// inter-page rate-limit sleep. Resumable at page boundaries: dropping the
/// stream abandons collection and already-yielded records are final.
pub struct AdStream<'c> {
    collector: &'c mut AdCollector,
    params: SearchParams,
    session_id: String,
    collation_token: String,
    cursor: Option<String>,
    state: StreamState,
    buffer: VecDeque<serde_json::Value>,
    has_next: bool,
    page_number: u64,
    collected: u64,
    started: Instant,
    first_page: bool,
}

impl AdStream<'_> {
    /// Number of records yielded so far.
    pub fn collected(&self) -> u64 {
        self.collected
    }

    /// Advance to the next record. Returns `None` once the stream has
    /// finished cleanly (exhaustion, `max_results`, or a rate limit after
    /// exhausted retries).
    pub async fn next(&mut self) -> Option<Result<Ad>> {
        loop {
            match self.state {
                StreamState::Done => return None,

                StreamState::Drain => {
                    if self.reached_cap() {
                        self.finish().await;
                        return None;
                    }
                    let Some(record) = self.buffer.pop_front() else {
                        if self.has_next {
                            self.state = StreamState::Fetch;
                            continue;
                        }
                        self.finish().await;
                        return None;
                    };

                    // Records without a usable identifier are skipped.
                    let Some(ad) = normalize_ad(&record) else {
                        debug!("skipping record without identifier");
                        continue;
                    };

                    if let Some(dedup) = self.collector.dedup.clone() {
                        let mut store = dedup.lock().await;
                        match store.has_seen(&ad.id).await {
                            Ok(true) => continue,
                            Ok(false) => {
                                if let Err(e) = store.mark_seen(&ad.id).await {
                                    warn!(ad_id = ad.id, error = %e, "failed to mark ad as seen");
                                }
                            }
                            Err(e) => {
                                warn!(ad_id = ad.id, error = %e, "dedup lookup failed");
                            }
                        }
                    }

                    if let Some(filter) = &self.collector.filter {
                        if !filter.passes(&ad) {
                            continue;
                        }
                    }

                    self.collected += 1;
                    self.collector.stats.ads_collected += 1;
                    self.collector
                        .emitter
                        .emit(EventType::AdCollected, json!({"ad": ad.to_json(false)}));
                    return Some(Ok(ad));
                }

                StreamState::Fetch => {
                    if self.reached_cap() {
                        self.finish().await;
                        return None;
                    }

                    if !self.first_page {
                        self.inter_request_delay().await;
                    }

                    let page_size = self
                        .params
                        .page_size
                        .unwrap_or(self.collector.config.page_size);
                    let query = AdSearchQuery {
                        query: &self.params.query,
                        country: &self.params.country,
                        ad_type: self.params.ad_type,
                        status: self.params.status,
                        media_type: self.params.media_type,
                        search_type: self.params.search_type,
                        page_ids: &self.params.page_ids,
                        cursor: self.cursor.as_deref(),
                        first: page_size,
                        sort: self.params.sort,
                        session_id: &self.session_id,
                        collation_token: &self.collation_token,
                    };

                    self.collector.stats.requests_made += 1;
                    match self.collector.client.search_ads(&query).await {
                        Ok(page) => {
                            self.first_page = false;
                            self.page_number += 1;
                            self.collector.stats.pages_fetched += 1;
                            self.has_next = page.next_cursor.is_some();
                            self.collector.emitter.emit(
                                EventType::PageFetched,
                                json!({
                                    "page_number": self.page_number,
                                    "ads_on_page": page.ads.len(),
                                    "has_next_page": self.has_next,
                                }),
                            );
                            if page.ads.is_empty() {
                                info!("no more results returned");
                                self.finish().await;
                                return None;
                            }
                            self.cursor = page.next_cursor;
                            self.buffer = page.ads.into();
                            self.state = StreamState::Drain;
                        }
                        Err(e) if e.is_rate_limit() => {
                            // Rate limit after exhausted retries terminates
                            // the stream cleanly.
                            warn!("retries exhausted on rate limit, ending collection");
                            self.finish().await;
                            return None;
                        }
                        Err(e) => {
                            self.collector.stats.errors += 1;
                            self.collector.emitter.emit(
                                EventType::ErrorOccurred,
                                json!({
                                    "error": e.to_string(),
                                    "context": "page fetch failed",
                                }),
                            );
                            self.finish().await;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }

    /// Drain the remaining records into a vector.
    pub async fn drain(mut self) -> Result<Vec<Ad>> {
        let mut ads = Vec::new();
        while let Some(item) = self.next().await {
            ads.push(item?);
        }
        Ok(ads)
    }

    fn reached_cap(&self) -> bool {
        self.params
            .max_results
            .is_some_and(|max| self.collected >= max)
    }

    async fn inter_request_delay(&self) {
        let base = self.collector.config.rate_limit_delay.as_secs_f64();
        let jitter = self.collector.config.jitter.as_secs_f64();
        let extra = if jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter)
        } else {
            0.0
        };
        tokio::time::sleep(Duration::from_secs_f64(base + extra)).await;
    }

    /// Terminal bookkeeping: stamp the dedup tracker, flush it, and emit
    /// `collection_finished` exactly once.
    async fn finish(&mut self) {
        if self.state == StreamState::Done {
            return;
        }
        self.state = StreamState::Done;
        self.collector.stats.end_time = Some(Utc::now());

        if let Some(dedup) = self.collector.dedup.clone() {
            let mut store = dedup.lock().await;
            if let Err(e) = store.update_collection_time().await {
                warn!(error = %e, "failed to record collection time");
            }
            if let Err(e) = store.save().await {
                warn!(error = %e, "failed to flush dedup state");
            }
        }

        let duration = self.started.elapsed().as_secs_f64();
        info!(total = self.collected, pages = self.page_number, "search completed");
        self.collector.emitter.emit(
            EventType::CollectionFinished,
            json!({
                "total_ads": self.collected,
                "total_pages": self.page_number,
                "duration_seconds": duration,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_country_is_rejected() {
        let mut collector = AdCollector::new(CollectorConfig::default());
        let params = SearchParams {
            country: "USA".to_string(),
            ..Default::default()
        };
        let err = collector.search(params).await.err().unwrap();
        match err {
            AdLibraryError::InvalidParameter { field, value, .. } => {
                assert_eq!(field, "country");
                assert_eq!(value, "USA");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn country_is_uppercased() {
        let mut params = SearchParams {
            country: "us".to_string(),
            ..Default::default()
        };
        params.validate().unwrap();
        assert_eq!(params.country, "US");
    }

    #[tokio::test]
    async fn vanity_page_url_is_rejected() {
        let mut collector = AdCollector::new(CollectorConfig::default());
        let err = collector
            .search_by_page_url("https://www.facebook.com/CocaCola", SearchParams::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AdLibraryError::InvalidParameter { field: "page_url", .. }
        ));
    }

    #[test]
    fn stats_duration() {
        let mut stats = CollectorStats::default();
        assert!(stats.duration_seconds().is_none());
        stats.start_time = Some(Utc::now());
        stats.end_time = Some(stats.start_time.unwrap() + chrono::Duration::seconds(3));
        assert_eq!(stats.duration_seconds(), Some(3.0));
    }
}
