//! adacquire - Ad library acquisition and research system.
//!
//! A programmatic collector for a large public ad archive: session
//! bootstrap and token extraction against its internal GraphQL endpoint,
//! cursor-paginated streaming collection with deduplication and client-side
//! filtering, proxy rotation, and lifecycle event observability.

pub mod cli;
pub mod client;
pub mod collector;
pub mod constants;
pub mod dedup;
pub mod error;
pub mod events;
pub mod export;
pub mod filters;
pub mod fingerprint;
pub mod media;
pub mod models;
pub mod normalize;
pub mod proxy;
pub mod url_parser;
pub mod webhook;

pub use client::{AdLibraryClient, ClientConfig, ProxyConfig};
pub use collector::{AdCollector, AdStream, CollectorConfig, CollectorStats, SearchParams};
pub use error::{AdLibraryError, Result};
pub use events::{Event, EventEmitter, EventType, Listener};
pub use filters::FilterConfig;
pub use models::{Ad, AdStatus, AdType, MediaType, PageSearchResult, SearchType, SortMode};
pub use proxy::ProxyPool;
