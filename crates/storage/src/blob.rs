use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use shared::domain::QueueDocument;

use crate::SnapshotStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// A remote JSON document addressed by URL: `GET` returns it, `PUT` replaces
/// it (the jsonblob.com contract).
#[derive(Clone)]
pub struct BlobStore {
    http: reqwest::Client,
    url: String,
}

impl BlobStore {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build blob http client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SnapshotStore for BlobStore {
    async fn load(&self) -> Result<Option<QueueDocument>> {
        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let document = serde_json::from_slice(&body)
            .with_context(|| format!("{} did not return a queue document", self.url))?;
        Ok(Some(document))
    }

    async fn save(&self, document: &QueueDocument) -> Result<()> {
        self.http
            .put(&self.url)
            .json(document)
            .send()
            .await
            .with_context(|| format!("PUT {} failed", self.url))?
            .error_for_status()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
