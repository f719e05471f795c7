use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::EncoderError;

/// Text -> vector inference. Must be deterministic for a given model version.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError>;

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Client for a text-embeddings-inference style `/embed` endpoint.
#[derive(Clone)]
pub struct HttpEncoder {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
}

impl HttpEncoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { inputs, normalize: true })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EncoderError::Status(response.status().as_u16()));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| EncoderError::Malformed(e.to_string()))?;
        if vectors.len() != inputs.len() {
            return Err(EncoderError::CountMismatch {
                expected: inputs.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EncoderError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EncoderError::Malformed("empty embedding list".to_string()))
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed(texts).await
    }
}

/// Stand-in when no model is configured. Every call fails, so the semantic
/// tier stays disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableEncoder;

#[async_trait]
impl Encoder for UnavailableEncoder {
    async fn encode(&self, _text: &str) -> Result<Vec<f32>, EncoderError> {
        Err(EncoderError::Unavailable("no encoder configured".to_string()))
    }

    async fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        Err(EncoderError::Unavailable("no encoder configured".to_string()))
    }
}

/// Runs an encoder call under a deadline and a cancellation token.
pub async fn bounded<T, F>(call: F, timeout: Duration, cancel: &CancellationToken) -> Result<T, EncoderError>
where
    F: Future<Output = Result<T, EncoderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EncoderError::Cancelled),
        outcome = tokio::time::timeout(timeout, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(EncoderError::Timeout(timeout.as_millis() as u64)),
        },
    }
}
