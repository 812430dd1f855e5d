use std::path::PathBuf;

use reqwest::Url;
use thiserror::Error;

use crate::trivia::DEFAULT_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {reason}")]
    InvalidUrl { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub data_dir: PathBuf,
    pub dialogue_db: String,
}

impl Config {
    /// Reads the settings from the process environment. `TELOXIDE_TOKEN` is
    /// picked up by `Bot::from_env` on its own.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("TRIVIA_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_url = Url::parse(&api_url).map_err(|err| ConfigError::InvalidUrl {
            key: "TRIVIA_API_URL",
            reason: err.to_string(),
        })?;
        if api_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl {
                key: "TRIVIA_API_URL",
                reason: "endpoints can't be appended to it".to_string(),
            });
        }

        Ok(Self {
            api_url,
            data_dir: lookup("TRIVIA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            dialogue_db: lookup("TRIVIA_DIALOGUE_DB").unwrap_or_else(|| "db.sqlite".to_string()),
        })
    }
}
