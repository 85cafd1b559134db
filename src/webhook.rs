//! Webhook forwarder for collected ads.
//!
//! Bridges the synchronous event emitter to an HTTP endpoint: a listener
//! pushes `ad_collected` payloads into a channel, and a background task
//! drains it, batching and POSTing with bounded retry. Listeners never
//! block on network I/O, and forwarding failures never disturb collection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{Event, EventType, Listener};

/// POSTs collected-ad payloads to an external endpoint.
pub struct WebhookSender {
    url: String,
    retries: u32,
    batch_size: usize,
    timeout: Duration,
}

impl WebhookSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retries: 3,
            batch_size: 1,
            timeout: Duration::from_secs(10),
        }
    }

    /// Retry attempts per POST (default 3).
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Ads buffered per POST; 1 sends immediately (default).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start the forwarder. Returns the listener to register for
    /// `ad_collected` and the handle of the background task. The task
    /// flushes its buffer and exits when the listener (and any clones)
    /// have been dropped.
    pub fn spawn(self) -> Result<(Listener, JoinHandle<()>)> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let (tx, rx) = mpsc::unbounded_channel::<Value>();

        let listener: Listener = Arc::new(move |event: &Event| {
            if event.event_type != EventType::AdCollected {
                return;
            }
            if let Some(ad) = event.data.get("ad") {
                // A closed channel means the forwarder is gone; there is
                // nothing useful the listener can do about it.
                let _ = tx.send(ad.clone());
            }
        });

        let handle = tokio::spawn(forward_loop(
            client,
            self.url,
            self.retries,
            self.batch_size,
            rx,
        ));
        Ok((listener, handle))
    }
}

async fn forward_loop(
    client: reqwest::Client,
    url: String,
    retries: u32,
    batch_size: usize,
    mut rx: mpsc::UnboundedReceiver<Value>,
) {
    let mut buffer: Vec<Value> = Vec::new();

    while let Some(ad) = rx.recv().await {
        buffer.push(ad);
        if buffer.len() >= batch_size {
            let batch = std::mem::take(&mut buffer);
            post_batch(&client, &url, retries, batch).await;
        }
    }

    // Channel closed: flush whatever is left.
    if !buffer.is_empty() {
        post_batch(&client, &url, retries, buffer).await;
    }
}

async fn post_batch(client: &reqwest::Client, url: &str, retries: u32, batch: Vec<Value>) {
    let count = batch.len();
    let payload = if count == 1 {
        batch.into_iter().next().unwrap()
    } else {
        json!({"ads": batch, "count": count})
    };

    for attempt in 0..retries {
        match client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url, status = %response.status(), "webhook POST succeeded");
                return;
            }
            Ok(response) => {
                warn!(
                    url,
                    status = %response.status(),
                    attempt = attempt + 1,
                    retries,
                    "webhook POST rejected"
                );
            }
            Err(e) => {
                warn!(url, attempt = attempt + 1, retries, error = %e, "webhook POST failed");
            }
        }
        if attempt + 1 < retries {
            tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
        }
    }
}
