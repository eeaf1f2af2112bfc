//! Platform API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use dynoscale_autoscale::{FleetMutator, FleetSnapshotSource};
use dynoscale_core::FleetSnapshot;
use dynoscale_core::config::HerokuConfig;

use crate::error::HerokuError;

/// Production Platform API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.heroku.com";

const API_VERSION: &str = "application/vnd.heroku+json; version=3";

/// One process type in an app's formation.
#[derive(Debug, Deserialize)]
struct Formation {
    #[serde(rename = "type")]
    process_type: String,
    quantity: u32,
}

impl From<Formation> for FleetSnapshot {
    fn from(f: Formation) -> Self {
        FleetSnapshot::new(f.process_type, f.quantity)
    }
}

/// A running dyno, as reported by `GET /apps/{app}/dynos`.
#[derive(Debug, Clone, Deserialize)]
pub struct Dyno {
    pub name: String,
    #[serde(rename = "type")]
    pub process_type: String,
    #[serde(default)]
    pub state: String,
}

/// Heroku Platform API client scoped to a single app
pub struct HerokuClient {
    base_url: Url,
    app: String,
    http: Client,
}

impl HerokuClient {
    /// Create a client for `app` against the Platform API at `base_url`.
    pub fn new(
        base_url: &str,
        app: impl Into<String>,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, HerokuError> {
        let parsed = Url::parse(base_url).map_err(|e| HerokuError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(HerokuError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base URL".to_string(),
            });
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| HerokuError::InvalidApiKey)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: parsed,
            app: app.into(),
            http,
        })
    }

    /// Build a client from the `[heroku]` config section.
    pub fn from_config(config: &HerokuConfig) -> Result<Self, HerokuError> {
        Self::new(
            config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
            config.app.clone(),
            &config.api_key()?,
            config.timeout()?,
        )
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Current quantity of every process type in the app.
    pub async fn fetch_formation(&self) -> Result<Vec<FleetSnapshot>, HerokuError> {
        let formation: Vec<Formation> = self
            .send(self.request(Method::GET, &["formation"]))
            .await?;
        debug!(app = %self.app, count = formation.len(), "listed formation");

        Ok(formation.into_iter().map(FleetSnapshot::from).collect())
    }

    /// Set `process_type` to `quantity` dynos.
    pub async fn update_formation(
        &self,
        process_type: &str,
        quantity: u32,
    ) -> Result<FleetSnapshot, HerokuError> {
        let body = serde_json::json!({ "quantity": quantity });
        let updated: Formation = self
            .send(
                self.request(Method::PATCH, &["formation", process_type])
                    .json(&body),
            )
            .await?;

        info!(
            app = %self.app,
            process_type = %updated.process_type,
            quantity = updated.quantity,
            "formation updated"
        );
        Ok(updated.into())
    }

    /// Dynos currently running for the app.
    pub async fn list_dynos(&self) -> Result<Vec<Dyno>, HerokuError> {
        self.send(self.request(Method::GET, &["dynos"])).await
    }

    /// Request against `/apps/{app}/{segments...}`.
    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new().
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("apps").push(&self.app).extend(segments);
        }
        self.http.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, HerokuError> {
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HerokuError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl FleetSnapshotSource for HerokuClient {
    async fn list_fleet(&self) -> anyhow::Result<Vec<FleetSnapshot>> {
        Ok(self.fetch_formation().await?)
    }

    async fn verify_access(&self) -> anyhow::Result<()> {
        let dynos = match self.list_dynos().await {
            Ok(dynos) => dynos,
            Err(e) if e.is_not_found() => {
                return Err(anyhow::Error::new(e)
                    .context(format!("app {:?} not found or not visible to this API key", self.app)));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(app = %self.app, dynos = dynos.len(), "heroku app reachable");
        Ok(())
    }
}

#[async_trait]
impl FleetMutator for HerokuClient {
    async fn set_quantity(&self, process_type: &str, quantity: u32) -> anyhow::Result<()> {
        match self.update_formation(process_type, quantity).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(anyhow::Error::new(e).context(format!(
                "process type {process_type:?} is not in the formation of {:?}",
                self.app
            ))),
            Err(e) if e.is_rate_limited() => {
                warn!(app = %self.app, process_type, "platform API rate limit reached");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
