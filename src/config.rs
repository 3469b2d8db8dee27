use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}")]
    InvalidVar(&'static str),

    #[error("Error reading {0}: {1}")]
    FeedConfigIo(String, std::io::Error),

    #[error("Error parsing {0}: {1}")]
    FeedConfigParse(String, toml::de::Error),
}

/// Fetch configuration for the realtime feed, kept in a TOML file so that
/// endpoint URLs and auth headers stay out of the code.
#[derive(Clone, Debug, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

fn default_poll_seconds() -> u64 {
    30
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_address: String,
    pub database_path: PathBuf,
    pub gtfs_static_dir: PathBuf,
    /// How many days of departures the importer materialises.
    pub import_days: u32,
    pub allow_origin: Option<String>,
    pub feed: FeedConfig,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let database_path = env::var("DATABASE_PATH")
            .map_err(|_| ConfigError::MissingVar("DATABASE_PATH"))?
            .into();

        let feed_path = env::var("FEED_CONFIG").unwrap_or_else(|_| "feed.toml".to_string());
        let feed_raw = std::fs::read_to_string(&feed_path)
            .map_err(|e| ConfigError::FeedConfigIo(feed_path.clone(), e))?;
        let feed =
            toml::from_str(&feed_raw).map_err(|e| ConfigError::FeedConfigParse(feed_path, e))?;

        let import_days = match env::var("IMPORT_DAYS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar("IMPORT_DAYS"))?,
            Err(_) => 14,
        };

        Ok(Config {
            listen_address: env::var("LISTEN_ADDRESS")
                .unwrap_or_else(|_| "127.0.0.1:6789".to_string()),
            database_path,
            gtfs_static_dir: env::var("GTFS_STATIC_DIR")
                .unwrap_or_else(|_| "gtfs".to_string())
                .into(),
            import_days,
            allow_origin: env::var("ALLOW_ORIGIN").ok(),
            feed,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn feed_config_defaults() {
        let config: FeedConfig =
            toml::from_str(r#"url = "https://example.org/realtime.json""#).unwrap();
        assert_eq!(config.url, "https://example.org/realtime.json");
        assert!(config.headers.is_empty());
        assert_eq!(config.poll_seconds, 30);
    }

    #[test]
    fn feed_config_with_headers() {
        let raw = r#"
            url = "https://example.org/realtime.json"
            poll_seconds = 15

            [headers]
            "Ocp-Apim-Subscription-Key" = "secret"
        "#;
        let config: FeedConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.poll_seconds, 15);
        assert_eq!(
            config.headers.get("Ocp-Apim-Subscription-Key").map(String::as_str),
            Some("secret")
        );
    }

    #[test]
    fn feed_config_requires_url() {
        assert!(toml::from_str::<FeedConfig>("poll_seconds = 15").is_err());
    }
}
