//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;

use crate::client::ProxyConfig;
use crate::collector::{AdCollector, CollectorConfig, SearchParams};
use crate::dedup;
use crate::events::EventType;
use crate::filters::FilterConfig;
use crate::models::{AdStatus, AdType, SearchType, SortMode};
use crate::proxy::ProxyPool;
use crate::webhook::WebhookSender;

#[derive(Parser)]
#[command(name = "adacquire")]
#[command(about = "Ad library acquisition and research system")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Jsonl,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the ad library and export the results
    Search {
        /// Search query string
        #[arg(short, long, default_value = "")]
        query: String,
        /// 2-letter country code
        #[arg(short, long, default_value = "US")]
        country: String,
        /// Ad type (ALL, POLITICAL_AND_ISSUE_ADS, HOUSING_ADS, ...)
        #[arg(long, default_value = "ALL")]
        ad_type: String,
        /// Active status (ACTIVE, INACTIVE, ALL)
        #[arg(long, default_value = "ACTIVE")]
        status: String,
        /// Search type (KEYWORD_EXACT_PHRASE, KEYWORD_UNORDERED, PAGE)
        #[arg(long, default_value = "KEYWORD_EXACT_PHRASE")]
        search_type: String,
        /// Collect ads for this page id only
        #[arg(long)]
        page_id: Option<String>,
        /// Sort by server relevancy instead of total impressions
        #[arg(long)]
        relevancy: bool,
        /// Maximum number of ads to collect (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        max_results: u64,
        /// Results per API request
        #[arg(long, default_value = "10")]
        page_size: u32,
        /// Output file path
        #[arg(short, long, default_value = "ads.json")]
        output: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
        /// Include the raw API record with each ad (json/jsonl only)
        #[arg(long)]
        include_raw: bool,
        /// Proxy endpoint (host:port, host:port:user:pass, or URL)
        #[arg(long)]
        proxy: Option<String>,
        /// File with one proxy endpoint per line
        #[arg(long)]
        proxy_file: Option<PathBuf>,
        /// SQLite file for cross-run deduplication
        #[arg(long)]
        dedup_db: Option<PathBuf>,
        /// Minimum impressions (client-side filter)
        #[arg(long)]
        min_impressions: Option<i64>,
        /// Minimum spend (client-side filter)
        #[arg(long)]
        min_spend: Option<i64>,
        /// Base delay between page requests in seconds
        #[arg(long, default_value = "2.0")]
        delay: f64,
        /// Forward each collected ad to this webhook URL
        #[arg(long)]
        webhook: Option<String>,
    },

    /// Search for pages by name via the typeahead endpoint
    Pages {
        /// Page name to search for
        query: String,
        /// 2-letter country code
        #[arg(short, long, default_value = "US")]
        country: String,
    },

    /// Collect all ads from a page URL or numeric page id
    Page {
        /// Page URL or numeric page id
        page: String,
        /// 2-letter country code
        #[arg(short, long, default_value = "US")]
        country: String,
        /// Maximum number of ads to collect (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        max_results: u64,
        /// Output file path
        #[arg(short, long, default_value = "ads.json")]
        output: PathBuf,
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            country,
            ad_type,
            status,
            search_type,
            page_id,
            relevancy,
            max_results,
            page_size,
            output,
            format,
            include_raw,
            proxy,
            proxy_file,
            dedup_db,
            min_impressions,
            min_spend,
            delay,
            webhook,
        } => {
            let proxy_config = match (proxy, proxy_file) {
                (Some(single), _) => ProxyConfig::single(&single)?,
                (None, Some(file)) => ProxyConfig::pool(Arc::new(ProxyPool::from_file(&file)?)),
                (None, None) => ProxyConfig::Direct,
            };

            let config = CollectorConfig {
                proxy: proxy_config,
                rate_limit_delay: Duration::from_secs_f64(delay.max(0.0)),
                ..Default::default()
            };
            let mut collector = AdCollector::new(config);

            if let Some(path) = dedup_db {
                collector = collector.with_dedup(dedup::persistent(&path)?);
            }
            if min_impressions.is_some() || min_spend.is_some() {
                collector = collector.with_filter(FilterConfig {
                    min_impressions,
                    min_spend,
                    ..Default::default()
                });
            }

            let webhook_task = match webhook {
                Some(url) => {
                    let (listener, handle) = WebhookSender::new(url).spawn()?;
                    collector.on_event(EventType::AdCollected, listener);
                    Some(handle)
                }
                None => None,
            };

            let mut params = SearchParams {
                query,
                country,
                ad_type: AdType::parse(&ad_type)?,
                status: AdStatus::parse(&status)?,
                search_type: SearchType::parse(&search_type)?,
                sort: if relevancy {
                    SortMode::Relevancy
                } else {
                    SortMode::TotalImpressions
                },
                max_results: (max_results > 0).then_some(max_results),
                page_size: Some(page_size),
                ..Default::default()
            };
            if let Some(id) = page_id {
                params.search_type = SearchType::Page;
                params.page_ids = vec![id];
            }

            let count = match format {
                OutputFormat::Json => {
                    collector
                        .collect_to_json(&output, params, include_raw)
                        .await?
                }
                OutputFormat::Csv => collector.collect_to_csv(&output, params).await?,
                OutputFormat::Jsonl => {
                    collector
                        .collect_to_jsonl(&output, params, include_raw)
                        .await?
                }
            };

            // The forwarder drains once the collector (and its listener
            // registrations) drop.
            drop(collector);
            if let Some(handle) = webhook_task {
                let _ = handle.await;
            }

            println!(
                "{} collected {} ads into {}",
                style("✓").green().bold(),
                style(count).bold(),
                output.display(),
            );
        }

        Commands::Pages { query, country } => {
            let mut collector = AdCollector::new(CollectorConfig::default());
            let pages = collector.search_pages(&query, &country).await?;
            if pages.is_empty() {
                println!("{} no pages found for {:?}", style("!").yellow(), query);
                return Ok(());
            }
            for page in pages {
                let verified = match page.page_verified {
                    Some(true) => style(" ✓").blue().to_string(),
                    _ => String::new(),
                };
                println!(
                    "{}  {}{}  {}",
                    style(&page.page_id).bold(),
                    page.page_name,
                    verified,
                    style(page.category.as_deref().unwrap_or("")).dim(),
                );
            }
        }

        Commands::Page {
            page,
            country,
            max_results,
            output,
            format,
        } => {
            let mut collector = AdCollector::new(CollectorConfig::default());
            let params = SearchParams {
                country,
                status: AdStatus::All,
                max_results: (max_results > 0).then_some(max_results),
                ..Default::default()
            };

            let ads = collector
                .search_by_page_url(&page, params.clone())
                .await?
                .drain()
                .await?;
            let count = ads.len();
            match format {
                OutputFormat::Json => {
                    crate::export::write_json(&output, &ads, &params, &collector.stats(), false)?
                }
                OutputFormat::Csv => crate::export::write_csv(&output, &ads)?,
                OutputFormat::Jsonl => crate::export::write_jsonl(&output, &ads, false)?,
            };

            println!(
                "{} collected {} ads into {}",
                style("✓").green().bold(),
                style(count).bold(),
                output.display(),
            );
        }
    }

    Ok(())
}
