//! Heroku Platform API error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HerokuError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid platform URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidApiKey,

    #[error(transparent)]
    Config(#[from] dynoscale_core::ConfigError),
}

impl HerokuError {
    /// The app or process type does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HerokuError::Api { status: 404, .. })
    }

    /// The account has exhausted its request budget.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HerokuError::Api { status: 429, .. })
    }
}
