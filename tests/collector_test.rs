//! End-to-end collection tests against a local mock of the remote service.
//!
//! The mock serves a landing page with embedded tokens and document ids,
//! a verification-challenge endpoint, and a scripted GraphQL endpoint, so
//! the full bootstrap → search → paginate → finish flow runs for real.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use adacquire::collector::{AdCollector, CollectorConfig, SearchParams};
use adacquire::dedup;
use adacquire::events::EventType;
use adacquire::filters::FilterConfig;

const LANDING_HTML: &str = r#"<!DOCTYPE html><html><head><script>
["LSD",[],{"token":"mock-lsd-token"}]
{"__spin_r":1032373751,"__spin_b":"trunk","__spin_t":1718000000}
{"__hsi":"7381549734201"}
["DTSGInitialData",[],{"token":"mock-dtsg"}]
{"__dyn":"mockdyn","__csr":"mockcsr","__comet_req":94}
{"name":"AdLibrarySearchPaginationQuery","queryID":"1111111111111"}
{"name":"useAdLibraryTypeaheadSuggestionDataSourceQuery","queryID":"2222222222222"}
</script></head><body>Ad Library</body></html>"#;

const CHALLENGE_HTML: &str = r#"<html><script>
fetch('/__rd_verify_abc123?challenge=0', {method: 'POST'});
</script></html>"#;

#[derive(Clone)]
enum Scripted {
    Page(Value),
    Forbidden,
    TooManyRequests { retry_after: u64 },
}

struct MockRemote {
    landing_hits: AtomicUsize,
    graphql_hits: AtomicUsize,
    challenge_hits: AtomicUsize,
    script: StdMutex<Vec<Scripted>>,
    /// Keep replaying the last scripted response instead of draining it.
    repeat_last: bool,
    /// Serve the verification challenge on the first landing load.
    challenge_first: bool,
}

impl MockRemote {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            landing_hits: AtomicUsize::new(0),
            graphql_hits: AtomicUsize::new(0),
            challenge_hits: AtomicUsize::new(0),
            script: StdMutex::new(script),
            repeat_last: false,
            challenge_first: false,
        })
    }

    fn repeating(script: Vec<Scripted>) -> Arc<Self> {
        let mut remote = Self::new(script);
        Arc::get_mut(&mut remote).unwrap().repeat_last = true;
        remote
    }

    fn with_challenge(script: Vec<Scripted>) -> Arc<Self> {
        let mut remote = Self::new(script);
        Arc::get_mut(&mut remote).unwrap().challenge_first = true;
        remote
    }
}

async fn landing(State(state): State<Arc<MockRemote>>) -> Response {
    let hits = state.landing_hits.fetch_add(1, Ordering::SeqCst);
    let body = if state.challenge_first && hits == 0 {
        CHALLENGE_HTML
    } else {
        LANDING_HTML
    };
    ([("content-type", "text/html")], body).into_response()
}

async fn challenge(State(state): State<Arc<MockRemote>>) -> Response {
    state.challenge_hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT.into_response()
}

async fn graphql(State(state): State<Arc<MockRemote>>) -> Response {
    state.graphql_hits.fetch_add(1, Ordering::SeqCst);
    let item = {
        let mut script = state.script.lock().unwrap();
        if script.is_empty() {
            Scripted::Page(ads_page(&[], None))
        } else if state.repeat_last && script.len() == 1 {
            script[0].clone()
        } else {
            script.remove(0)
        }
    };
    match item {
        Scripted::Page(value) => (
            [("content-type", "application/json")],
            format!("for (;;);{value}"),
        )
            .into_response(),
        Scripted::Forbidden => StatusCode::FORBIDDEN.into_response(),
        Scripted::TooManyRequests { retry_after } => (
            StatusCode::TOO_MANY_REQUESTS,
            [("retry-after", retry_after.to_string())],
            "",
        )
            .into_response(),
    }
}

async fn serve(state: Arc<MockRemote>) -> String {
    let app = Router::new()
        .route("/ads/library/", get(landing))
        .route("/api/graphql/", post(graphql))
        .route("/__rd_verify_abc123", post(challenge))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn ads_page(records: &[Value], next_cursor: Option<&str>) -> Value {
    json!({"data": {"ad_library_main": {"search_results_connection": {
        "edges": [{"node": {"collated_results": records}}],
        "page_info": {
            "has_next_page": next_cursor.is_some(),
            "end_cursor": next_cursor,
        }
    }}}})
}

fn ad(id: &str) -> Value {
    json!({
        "ad_archive_id": id,
        "page_id": "pg-1",
        "page_name": "Mock Page",
        "is_active": true,
        "cards": [{"body": format!("Body of {id}"), "title": "Mock"}],
    })
}

fn test_config(base_url: &str) -> CollectorConfig {
    CollectorConfig {
        base_url: base_url.to_string(),
        rate_limit_delay: Duration::ZERO,
        jitter: Duration::ZERO,
        retry_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

type EventLog = Arc<StdMutex<Vec<(String, Value)>>>;

fn record_events(collector: &AdCollector) -> EventLog {
    let log: EventLog = Arc::new(StdMutex::new(Vec::new()));
    for event_type in EventType::ALL {
        let log = Arc::clone(&log);
        collector.on_event(
            event_type,
            Arc::new(move |event| {
                log.lock()
                    .unwrap()
                    .push((event.event_type.as_str().to_string(), event.data.clone()));
            }),
        );
    }
    log
}

fn event_names(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
}

fn events_of(log: &EventLog, name: &str) -> Vec<Value> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, d)| d.clone())
        .collect()
}

#[tokio::test]
async fn happy_path_two_pages_full_event_trace() {
    let remote = MockRemote::new(vec![
        Scripted::Page(ads_page(&[ad("A1"), ad("A2"), ad("A3")], Some("cursor-2"))),
        Scripted::Page(ads_page(&[ad("A4")], None)),
    ]);
    let base = serve(Arc::clone(&remote)).await;

    let mut collector = AdCollector::new(test_config(&base));
    let log = record_events(&collector);

    let ads = collector
        .collect(SearchParams {
            query: "solar".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let ids: Vec<&str> = ads.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "A2", "A3", "A4"]);
    assert_eq!(remote.graphql_hits.load(Ordering::SeqCst), 2);

    assert_eq!(
        event_names(&log),
        vec![
            "collection_started",
            "page_fetched",
            "ad_collected",
            "ad_collected",
            "ad_collected",
            "page_fetched",
            "ad_collected",
            "collection_finished",
        ]
    );

    let pages = events_of(&log, "page_fetched");
    assert_eq!(pages[0]["page_number"], 1);
    assert_eq!(pages[0]["ads_on_page"], 3);
    assert_eq!(pages[0]["has_next_page"], true);
    assert_eq!(pages[1]["page_number"], 2);
    assert_eq!(pages[1]["ads_on_page"], 1);
    assert_eq!(pages[1]["has_next_page"], false);

    let finished = &events_of(&log, "collection_finished")[0];
    assert_eq!(finished["total_ads"], 4);
    assert_eq!(finished["total_pages"], 2);

    // The ad_collected count always equals the yielded count.
    assert_eq!(events_of(&log, "ad_collected").len(), ads.len());

    let stats = collector.stats();
    assert_eq!(stats.ads_collected, 4);
    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn single_403_triggers_refresh_and_recovers() {
    let remote = MockRemote::new(vec![
        Scripted::Forbidden,
        Scripted::Page(ads_page(&[ad("A1")], None)),
    ]);
    let base = serve(Arc::clone(&remote)).await;

    let mut collector = AdCollector::new(test_config(&base));
    let log = record_events(&collector);

    let ads = collector.collect(SearchParams::default()).await.unwrap();

    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].id, "A1");
    assert_eq!(events_of(&log, "session_refreshed").len(), 1);
    assert!(events_of(&log, "error_occurred").is_empty());
    // Bootstrap, then a second landing load for the refresh.
    assert_eq!(remote.landing_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dedup_across_runs_with_persistent_tracker() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("seen.db");

    // Run 1 yields A1 and A2.
    {
        let remote = MockRemote::new(vec![Scripted::Page(ads_page(&[ad("A1"), ad("A2")], None))]);
        let base = serve(remote).await;
        let mut collector = AdCollector::new(test_config(&base))
            .with_dedup(dedup::persistent(&db_path).unwrap());
        let ads = collector.collect(SearchParams::default()).await.unwrap();
        assert_eq!(ads.len(), 2);
    }

    // Run 2 sees A2 again plus a new A3; only A3 comes through.
    {
        let remote = MockRemote::new(vec![Scripted::Page(ads_page(&[ad("A2"), ad("A3")], None))]);
        let base = serve(remote).await;
        let mut collector = AdCollector::new(test_config(&base))
            .with_dedup(dedup::persistent(&db_path).unwrap());
        let ads = collector.collect(SearchParams::default()).await.unwrap();
        let ids: Vec<&str> = ads.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["A3"]);
    }
}

#[tokio::test]
async fn filter_includes_records_with_missing_data() {
    let low = json!({
        "ad_archive_id": "LOW",
        "impressions": {"lower_bound": 100, "upper_bound": 500},
    });
    let unknown = json!({"ad_archive_id": "UNKNOWN"});

    let remote = MockRemote::new(vec![Scripted::Page(ads_page(&[low, unknown], None))]);
    let base = serve(remote).await;

    let mut collector = AdCollector::new(test_config(&base)).with_filter(FilterConfig {
        min_impressions: Some(1000),
        ..Default::default()
    });

    let ads = collector.collect(SearchParams::default()).await.unwrap();
    let ids: Vec<&str> = ads.iter().map(|a| a.id.as_str()).collect();
    // The record with upper bound 500 is rejected; the one with no
    // impressions data at all is included.
    assert_eq!(ids, vec!["UNKNOWN"]);
}

#[tokio::test]
async fn rate_limit_after_retries_terminates_cleanly() {
    let remote = MockRemote::repeating(vec![Scripted::TooManyRequests { retry_after: 0 }]);
    let base = serve(Arc::clone(&remote)).await;

    let mut config = test_config(&base);
    config.max_retries = 2;
    let mut collector = AdCollector::new(config);
    let log = record_events(&collector);

    let ads = collector.collect(SearchParams::default()).await.unwrap();

    assert!(ads.is_empty());
    assert_eq!(events_of(&log, "rate_limited").len(), 2);
    assert_eq!(remote.graphql_hits.load(Ordering::SeqCst), 2);

    let finished = events_of(&log, "collection_finished");
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0]["total_ads"], 0);
    assert!(events_of(&log, "error_occurred").is_empty());
}

#[tokio::test]
async fn max_results_caps_yield() {
    let remote = MockRemote::new(vec![
        Scripted::Page(ads_page(&[ad("A1"), ad("A2"), ad("A3")], Some("c2"))),
        Scripted::Page(ads_page(&[ad("A4")], None)),
    ]);
    let base = serve(Arc::clone(&remote)).await;

    let mut collector = AdCollector::new(test_config(&base));
    let ads = collector
        .collect(SearchParams {
            max_results: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(ads.len(), 2);
    // The cap is reached on the first page; the second is never fetched.
    assert_eq!(remote.graphql_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn verification_challenge_resolves_in_one_round() {
    let remote =
        MockRemote::with_challenge(vec![Scripted::Page(ads_page(&[ad("A1")], None))]);
    let base = serve(Arc::clone(&remote)).await;

    let mut collector = AdCollector::new(test_config(&base));
    let ads = collector.collect(SearchParams::default()).await.unwrap();

    assert_eq!(ads.len(), 1);
    assert_eq!(remote.challenge_hits.load(Ordering::SeqCst), 1);
    assert_eq!(remote.landing_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn typeahead_page_search() {
    let suggestions = json!({"data": {"ad_library_main": {"typeahead_suggestions": {
        "page_results": [
            {"page_id": "42", "page_name": "Mock Brand", "is_verified": true},
            {"page_id": "43", "page_name": "Mock Brand Fan Club"},
        ]
    }}}});
    let remote = MockRemote::new(vec![Scripted::Page(suggestions)]);
    let base = serve(remote).await;

    let mut collector = AdCollector::new(test_config(&base));
    let pages = collector.search_pages("mock brand", "US").await.unwrap();

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].page_id, "42");
    assert_eq!(pages[0].page_verified, Some(true));
}

#[tokio::test]
async fn duplicate_ids_within_one_run_are_yielded_once() {
    // The same collation can surface an ad on consecutive pages.
    let remote = MockRemote::new(vec![
        Scripted::Page(ads_page(&[ad("A1"), ad("A2")], Some("c2"))),
        Scripted::Page(ads_page(&[ad("A2"), ad("A3")], None)),
    ]);
    let base = serve(remote).await;

    let mut collector = AdCollector::new(test_config(&base)).with_dedup(dedup::memory());
    let ads = collector.collect(SearchParams::default()).await.unwrap();

    let ids: Vec<&str> = ads.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["A1", "A2", "A3"]);
}
