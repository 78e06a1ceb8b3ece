//! Google Fit REST client.
//!
//! Implements [`FitnessApi`] over HTTPS with `reqwest`. Every request carries
//! the caller's bearer token and a JSON body; any non-2xx response becomes
//! [`ApiError::Status`] with the response text attached. Requests are not
//! retried here: per-chunk failures are the uploader's concern.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::Deserialize;
use tracing::debug;

use health_sync_core::remote::{
    ApiError, CreateDataSource, DataSource, DatasetPatch, FitnessApi, SessionBody,
};

use crate::config::UploadConfig;

/// `GET /dataSources` response.
#[derive(Debug, Deserialize)]
struct DataSourceList {
    #[serde(rename = "dataSource", default)]
    data_source: Vec<DataSource>,
}

pub struct GoogleFitClient {
    client: reqwest::Client,
    base: Url,
}

impl GoogleFitClient {
    /// Client rooted at `api_base`. Without `timeout`, requests wait as
    /// long as the transport allows.
    pub fn new(api_base: &str, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(api_base)
            .map_err(|e| anyhow::anyhow!("Invalid upload.api_base '{}': {}", api_base, e))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Invalid upload.api_base '{}': not a base URL", api_base);
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Self::new(&config.api_base, config.timeout_secs.map(Duration::from_secs))
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("cannot extend base URL {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

fn decode(e: reqwest::Error) -> ApiError {
    ApiError::Decode(e.to_string())
}

#[async_trait]
impl FitnessApi for GoogleFitClient {
    async fn list_data_sources(&self, token: &str) -> Result<Vec<DataSource>, ApiError> {
        let url = self.endpoint(&["dataSources"])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        let list: DataSourceList = check(response).await?.json().await.map_err(decode)?;
        debug!(count = list.data_source.len(), "listed data sources");
        Ok(list.data_source)
    }

    async fn create_data_source(
        &self,
        token: &str,
        request: &CreateDataSource,
    ) -> Result<DataSource, ApiError> {
        let url = self.endpoint(&["dataSources"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(decode)
    }

    async fn patch_dataset(&self, token: &str, patch: &DatasetPatch) -> Result<(), ApiError> {
        let dataset_id = patch.dataset_id();
        let url = self.endpoint(&[
            "dataSources",
            &patch.data_source_id,
            "datasets",
            &dataset_id,
        ])?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(patch)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        debug!(dataset = %dataset_id, points = patch.point.len(), "patched dataset");
        Ok(())
    }

    async fn put_session(&self, token: &str, session: &SessionBody) -> Result<(), ApiError> {
        let url = self.endpoint(&["sessions", &session.id])?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(session)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }
}
