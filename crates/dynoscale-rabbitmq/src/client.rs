//! Management API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use dynoscale_autoscale::QueueSnapshotSource;
use dynoscale_core::QueueSnapshot;
use dynoscale_core::config::RabbitMqConfig;

use crate::error::RabbitMqError;

/// One entry of `GET /api/queues`. Counters are absent until the broker
/// has published stats for a new queue.
#[derive(Debug, Deserialize)]
struct QueueInfo {
    name: String,
    #[serde(default)]
    messages_ready: Option<u64>,
    #[serde(default)]
    messages_unacknowledged: Option<u64>,
}

impl From<QueueInfo> for QueueSnapshot {
    fn from(q: QueueInfo) -> Self {
        QueueSnapshot::new(
            q.name,
            q.messages_ready.unwrap_or(0),
            q.messages_unacknowledged.unwrap_or(0),
        )
    }
}

/// `GET /api/whoami` response.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmI {
    pub name: String,
}

/// RabbitMQ management API client
pub struct RabbitMqClient {
    base_url: Url,
    username: String,
    password: String,
    vhost: Option<String>,
    http: Client,
}

impl RabbitMqClient {
    /// Create a client for the management API at `base_url`.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RabbitMqError> {
        let parsed = Url::parse(base_url).map_err(|e| RabbitMqError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(RabbitMqError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: parsed,
            username: username.into(),
            password: password.into(),
            vhost: None,
            http,
        })
    }

    /// Build a client from the `[rabbitmq]` config section.
    pub fn from_config(config: &RabbitMqConfig) -> Result<Self, RabbitMqError> {
        let client = Self::new(
            &config.url,
            config.username.clone(),
            config.password()?,
            config.timeout()?,
        )?;
        Ok(match &config.vhost {
            Some(vhost) => client.with_vhost(vhost.clone()),
            None => client,
        })
    }

    /// Only list queues in `vhost`.
    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = Some(vhost.into());
        self
    }

    /// Current backlog of every visible queue.
    pub async fn fetch_queues(&self) -> Result<Vec<QueueSnapshot>, RabbitMqError> {
        let mut segments = vec!["api", "queues"];
        if let Some(vhost) = &self.vhost {
            segments.push(vhost.as_str());
        }

        let queues: Vec<QueueInfo> = self.get_json(&segments).await?;
        debug!(count = queues.len(), vhost = ?self.vhost, "listed queues");

        Ok(queues.into_iter().map(QueueSnapshot::from).collect())
    }

    /// The user the configured credentials authenticate as.
    pub async fn whoami(&self) -> Result<WhoAmI, RabbitMqError> {
        self.get_json(&["api", "whoami"]).await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new().
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RabbitMqError> {
        let url = self.endpoint(segments);
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RabbitMqError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl QueueSnapshotSource for RabbitMqClient {
    async fn list_queues(&self) -> anyhow::Result<Vec<QueueSnapshot>> {
        Ok(self.fetch_queues().await?)
    }

    async fn verify_access(&self) -> anyhow::Result<()> {
        let me = match self.whoami().await {
            Ok(me) => me,
            Err(e) if e.is_unauthorized() => {
                return Err(anyhow::Error::new(e)
                    .context(format!("broker rejected credentials for {:?}", self.username)));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(user = %me.name, "rabbitmq credentials accepted");
        Ok(())
    }
}
