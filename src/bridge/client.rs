use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::bridge::{BridgeHealth, ListResponse, ReadRequest, ReadResponse};
use crate::config::BridgeClientConfig;
use crate::error::{GatewayError, Result};

#[derive(Clone, Debug)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    list_timeout: Duration,
    read_timeout: Duration,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(&BridgeClientConfig {
            base_url: base_url.into(),
            ..BridgeClientConfig::default()
        })
    }

    pub fn from_config(cfg: &BridgeClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            list_timeout: Duration::from_secs(cfg.list_timeout_secs),
            read_timeout: Duration::from_secs(cfg.read_timeout_secs),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<BridgeHealth> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.list_timeout)
            .send()
            .await?;
        Self::decode(resp).await
    }

    /// Every file under the bridge root, relative and sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let resp = self
            .http
            .get(format!("{}/list", self.base_url))
            .timeout(self.list_timeout)
            .send()
            .await?;
        let body: ListResponse = Self::decode(resp).await?;
        debug!(count = body.files.len(), "bridge listed files");
        Ok(body.files)
    }

    pub async fn read(&self, path: &str) -> Result<ReadResponse> {
        let resp = self
            .http
            .post(format!("{}/read", self.base_url))
            .timeout(self.read_timeout)
            .json(&ReadRequest {
                path: path.to_string(),
            })
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Bridge {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }
}
