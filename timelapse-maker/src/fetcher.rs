//! Cached HTTP acquisition of the source image.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Local, TimeDelta};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::debug;

use crate::utils::clock::Clock;
use crate::{Error, Result};

/// How long a fetched payload stays valid, in seconds. Shorter than any
/// acquisition cadence, long enough to collapse near-simultaneous
/// triggers from windows sharing one source into a single network call.
const CACHE_TTL_SECS: i64 = 30;

/// Bound on a single request so an acquisition run cannot hang on the
/// network.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedPayload {
    bytes: Bytes,
    valid_until: DateTime<Local>,
}

/// Fetches the source image, serving a short-lived cache to concurrent
/// callers.
pub struct ImageFetcher {
    client: reqwest::Client,
    url: String,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    cache: Mutex<Option<CachedPayload>>,
}

impl ImageFetcher {
    pub fn new(url: String, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(url, clock, TimeDelta::seconds(CACHE_TTL_SECS))
    }

    pub fn with_ttl(url: String, clock: Arc<dyn Clock>, ttl: TimeDelta) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url,
            ttl,
            clock,
            cache: Mutex::new(None),
        }
    }

    /// Return the source image bytes, refreshing the cache when stale.
    ///
    /// The staleness check and the refresh-and-store both happen under one
    /// lock, so concurrent callers within a TTL window share a single
    /// network call and receive identical bytes.
    pub async fn fetch(&self) -> Result<Bytes> {
        let mut cache = self.cache.lock().await;

        let now = self.clock.now();
        if let Some(cached) = cache.as_ref() {
            if now < cached.valid_until {
                debug!("returning cached payload");
                return Ok(cached.bytes.clone());
            }
        }

        debug!(url = %self.url, "fetching source image");
        let response = self.client.get(&self.url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(Error::RemoteStatus {
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        *cache = Some(CachedPayload {
            bytes: bytes.clone(),
            valid_until: now + self.ttl,
        });
        Ok(bytes)
    }
}
