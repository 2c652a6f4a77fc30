use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ElasticsearchSettings;
use crate::error::BackendError;
use crate::translator::SearchBackend;

/// [`SearchBackend`] talking to an Elasticsearch cluster over HTTP.
#[derive(Clone)]
pub struct ElasticsearchBackend {
    client: Client,
    base_url: String,
}

impl ElasticsearchBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &ElasticsearchSettings) -> Result<Self, BackendError> {
        Self::new(&settings.url, Duration::from_secs(settings.timeout_secs))
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.base_url, index)
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError> {
        let url = self.search_url(index);
        debug!(url = %url, "Sending search request");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Search request was not successful");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}
