//! Content classification collaborator.
//!
//! Classification runs after a message has been stored and broadcast, so a
//! slow or failing classifier never holds up delivery.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: String,
    #[serde(default)]
    pub flagged: bool,
    /// Replacement text, when the classifier rewrites the message (e.g. masking).
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier returned {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// `Ok(None)` means the classifier had nothing to say about this text.
    async fn classify(&self, content: &str) -> Result<Option<Classification>, ClassifierError>;
}

pub struct NoopClassifier;

#[async_trait]
impl ContentClassifier for NoopClassifier {
    async fn classify(&self, _content: &str) -> Result<Option<Classification>, ClassifierError> {
        Ok(None)
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    content: &'a str,
}

/// POSTs `{"content": ...}` and expects a [`Classification`] back; `204` means no verdict.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ContentClassifier for HttpClassifier {
    async fn classify(&self, content: &str) -> Result<Option<Classification>, ClassifierError> {
        let res = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest { content })
            .send()
            .await?;

        let status = res.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClassifierError::Status(status));
        }
        Ok(Some(res.json().await?))
    }
}

pub fn from_config(config: &Config) -> Arc<dyn ContentClassifier> {
    match &config.classifier_url {
        Some(url) => {
            tracing::info!(url = %url, "content classifier enabled");
            Arc::new(HttpClassifier::new(url.clone()))
        }
        None => Arc::new(NoopClassifier),
    }
}
