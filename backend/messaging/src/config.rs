use dotenvy::dotenv;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on messages returned per fetch or pushed per live
    /// snapshot.
    pub fetch_limit: usize,
    /// Maximum accepted message body length, in bytes.
    pub max_content_len: usize,
    /// Whether unread-count increases trigger a local alert.
    pub alert_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch_limit: 200,
            max_content_len: 4000,
            alert_enabled: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let defaults = Self::default();

        let fetch_limit = env::var("LOUNGE_FETCH_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.fetch_limit);
        if fetch_limit == 0 {
            return Err(AppError::Config(
                "LOUNGE_FETCH_LIMIT must be positive".into(),
            ));
        }

        let max_content_len = env::var("LOUNGE_MAX_CONTENT_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_content_len);
        if max_content_len == 0 {
            return Err(AppError::Config(
                "LOUNGE_MAX_CONTENT_LEN must be positive".into(),
            ));
        }

        let alert_enabled = env::var("LOUNGE_ALERT_ENABLED")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(defaults.alert_enabled);

        Ok(Self {
            fetch_limit,
            max_content_len,
            alert_enabled,
        })
    }
}
