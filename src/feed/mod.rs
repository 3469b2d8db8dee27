pub(crate) mod serde_helpers;
pub mod structure;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::time::sleep;
use url::Url;

use crate::config::FeedConfig;
use crate::realtime::RealtimeUpdateManager;
use structure::FeedMessage;

#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("Invalid feed config: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deserialize error: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Fetches the realtime feed. URL and request headers come from the feed
/// config file, never from constants.
#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> FeedResult<FeedClient> {
        let url = Url::parse(&config.url).map_err(|e| FeedError::Config(e.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FeedError::Config(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| FeedError::Config(e.to_string()))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(FeedClient {
            client,
            url,
            poll_interval: Duration::from_secs(config.poll_seconds),
        })
    }

    pub async fn get_realtime_feed(&self) -> FeedResult<FeedMessage> {
        log::debug!("Requesting {}", self.url);
        let response = self.client.get(self.url.clone()).send().await?;

        let data_str = response.text().await?;
        log::trace!("Response: {}", data_str);
        let feed = serde_json::from_str(&data_str)?;

        Ok(feed)
    }
}

/// A feed is applied only when its header timestamp is newer than the last
/// applied one. Feeds without a header timestamp cannot be ordered, so they
/// are always applied.
fn is_newer_feed(timestamp: Option<DateTime<Utc>>, last_applied: DateTime<Utc>) -> bool {
    match timestamp {
        Some(timestamp) => timestamp > last_applied,
        None => true,
    }
}

/// Polls the feed forever, replacing the manager contents whenever a newer
/// feed arrives. Fetch and decode errors are logged and retried.
pub async fn monitor_feed(client: FeedClient, manager: Arc<Mutex<RealtimeUpdateManager>>) {
    log::info!("Feed monitor is running");

    let mut last_update_time = Utc.timestamp_opt(0, 0).unwrap();

    loop {
        let feed = match client.get_realtime_feed().await {
            Ok(feed) => feed,
            Err(e) => {
                log::error!("Error fetching realtime feed: {}", e);
                sleep(client.poll_interval).await;
                continue;
            }
        };

        if is_newer_feed(feed.header.timestamp, last_update_time) {
            let count = feed.entity.len();
            if let Some(timestamp) = feed.header.timestamp {
                last_update_time = timestamp;
            }
            manager.lock().unwrap().load_feed(feed);
            log::debug!("Loaded {} feed entities", count);
        } else {
            log::debug!("No new updates");
        }

        sleep(client.poll_interval).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn client_rejects_bad_config() {
        let config = FeedConfig {
            url: "not a url".to_string(),
            headers: Default::default(),
            poll_seconds: 30,
        };
        assert!(matches!(FeedClient::new(&config), Err(FeedError::Config(_))));
    }

    #[test]
    fn client_accepts_headers() {
        let mut headers = std::collections::HashMap::new();
        headers.insert("Ocp-Apim-Subscription-Key".to_string(), "secret".to_string());
        let config = FeedConfig {
            url: "https://example.org/realtime.json".to_string(),
            headers,
            poll_seconds: 30,
        };
        let client = FeedClient::new(&config).unwrap();
        assert_eq!(client.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn only_newer_feeds_are_applied() {
        let last = Utc.timestamp_opt(1000, 0).unwrap();

        assert!(is_newer_feed(Some(Utc.timestamp_opt(1001, 0).unwrap()), last));
        assert!(!is_newer_feed(Some(last), last));
        assert!(!is_newer_feed(Some(Utc.timestamp_opt(999, 0).unwrap()), last));
        // a feed without a timestamp cannot be ordered and is never dropped
        assert!(is_newer_feed(None, last));
    }
}
