//! RabbitMQ management API error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RabbitMqError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("management API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid management URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Config(#[from] dynoscale_core::ConfigError),
}

impl RabbitMqError {
    /// Credentials were rejected by the broker.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RabbitMqError::Api { status: 401 | 403, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_unauthorized() {
        let err = RabbitMqError::Api {
            status: 401,
            body: String::new(),
        };
        assert!(err.is_unauthorized());

        let err = RabbitMqError::Api {
            status: 503,
            body: "down".into(),
        };
        assert!(!err.is_unauthorized());
        assert_eq!(err.to_string(), "management API returned 503: down");
    }
}
