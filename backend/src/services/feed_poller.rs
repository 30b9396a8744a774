//! Collision feed polling.
//!
//! Each poll fetches the raw feed body, decodes it and replaces the collision
//! table on the live board. A failed poll leaves the previous table in place
//! and flags it stale; its age keeps growing until a poll succeeds again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::live::LiveBoard;
use crate::parsing::{CollisionFeed, CollisionFeedDecoder, FeedFormat};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    #[error("Collision feed request failed: {0}")]
    Transport(String),

    #[error("Collision feed answered with HTTP {0}")]
    Status(u16),

    #[error("Collision feed did not answer within {0:?}")]
    Timeout(Duration),
}

/// Where raw feed bodies come from.
#[async_trait]
pub trait CollisionFeedSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FeedError>;
}

/// Feed served over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CollisionFeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<String, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }
}

/// Feed body held in memory. Used for tests and offline runs.
#[derive(Debug, Clone)]
pub struct StaticFeedSource {
    body: Arc<RwLock<Result<String, FeedError>>>,
}

impl StaticFeedSource {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Arc::new(RwLock::new(Ok(body.into()))),
        }
    }

    pub fn set_body(&self, body: impl Into<String>) {
        *self.body.write() = Ok(body.into());
    }

    pub fn set_error(&self, error: FeedError) {
        *self.body.write() = Err(error);
    }
}

#[async_trait]
impl CollisionFeedSource for StaticFeedSource {
    async fn fetch(&self) -> Result<String, FeedError> {
        self.body.read().clone()
    }
}

/// Fetch, decode and publish the collision feed.
pub struct CollisionFeedPoller {
    source: Arc<dyn CollisionFeedSource>,
    decoder: Box<dyn CollisionFeedDecoder>,
    timeout: Duration,
    /// Drop records of other sites when set.
    site: Option<String>,
}

impl CollisionFeedPoller {
    pub fn new(source: Arc<dyn CollisionFeedSource>, format: FeedFormat, timeout: Duration) -> Self {
        Self {
            source,
            decoder: format.decoder(),
            timeout,
            site: None,
        }
    }

    /// Only publish records tagged with `site`.
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// One fetch and decode. Rejected records are logged and dropped.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<CollisionFeed, FeedError> {
        let body = tokio::time::timeout(self.timeout, self.source.fetch())
            .await
            .map_err(|_| FeedError::Timeout(self.timeout))??;

        let mut feed = self.decoder.decode(&body, now);
        for error in &feed.rejected {
            warn!(%error, format = ?self.decoder.format(), "Skipping collision record");
        }
        if let Some(site) = &self.site {
            let dropped = feed.retain_site(site);
            if dropped > 0 {
                debug!(site = %site, dropped, "Ignoring collisions reported for other sites");
            }
        }
        Ok(feed)
    }

    /// Poll every `period` until cancelled.
    pub async fn run(self, board: LiveBoard, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            match self.poll_once(now).await {
                Ok(feed) => {
                    debug!(
                        active = feed.active.len(),
                        preview = feed.preview.len(),
                        "Collision feed refreshed"
                    );
                    board.publish_collisions(feed, now);
                }
                Err(error) => {
                    warn!(%error, "Collision feed poll failed");
                    board.mark_collisions_stale();
                }
            }
        }
        debug!("Collision feed task stopped");
    }
}
