use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::RecognizerError;

/// Label ("DATE", "TIME", "PERSON", ...) -> spans found in the text.
pub type LabeledSpans = BTreeMap<String, Vec<String>>;

/// Named-entity extraction used to check typed dialogue slots.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Result<LabeledSpans, RecognizerError>;
}

/// Client for an NER server exposing `POST /entities {"text": ...}`.
#[derive(Clone)]
pub struct HttpRecognizer {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct EntitiesRequest<'a> {
    text: &'a str,
}

impl HttpRecognizer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EntityRecognizer for HttpRecognizer {
    async fn extract_entities(&self, text: &str) -> Result<LabeledSpans, RecognizerError> {
        let response = self
            .client
            .post(format!("{}/entities", self.base_url))
            .json(&EntitiesRequest { text })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Recognizer that is never available. Typed slots then accept raw input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecognizer;

#[async_trait]
impl EntityRecognizer for NullRecognizer {
    async fn extract_entities(&self, _text: &str) -> Result<LabeledSpans, RecognizerError> {
        Err(RecognizerError::Unavailable)
    }
}
