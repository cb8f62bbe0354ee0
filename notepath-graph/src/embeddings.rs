use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::EmbeddingSettings;
use crate::errors::{GraphError, GraphResult};

/// Turns text into vectors. The indexer only depends on this trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed_batch(&self, inputs: &[String]) -> GraphResult<Vec<Vec<f32>>>;
}

/// Client for an Ollama-compatible `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    batch: usize,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            batch: settings.batch.max(1),
            client: reqwest::Client::new(),
        }
    }

    async fn request(&self, inputs: &[String]) -> GraphResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GraphError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;
        match (payload.embeddings, payload.embedding) {
            (Some(embeddings), _) => Ok(embeddings),
            (None, Some(embedding)) => Ok(vec![embedding]),
            (None, None) => Err(GraphError::Embedding(
                "embedding response missing vectors".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn model(&self) -> &str {
        &self.model
    }

    /// Sends `inputs` in slices of the configured batch size.
    async fn embed_batch(&self, inputs: &[String]) -> GraphResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for slice in inputs.chunks(self.batch) {
            let batch = self.request(slice).await?;
            if batch.len() != slice.len() {
                return Err(GraphError::Embedding(format!(
                    "expected {} vectors, got {}",
                    slice.len(),
                    batch.len()
                )));
            }
            vectors.extend(batch);
        }
        debug!(count = vectors.len(), model = %self.model, "embedded batch");
        Ok(vectors)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}

#[cfg(all(test, feature = "live-tests"))]
mod live_tests {
    use super::*;

    #[tokio::test]
    async fn embeds_against_local_ollama() {
        let client = EmbeddingClient::new(&EmbeddingSettings::default());
        let vectors = client
            .embed_batch(&["graph search".to_string(), "note taking".to_string()])
            .await
            .expect("ollama reachable");
        assert_eq!(vectors.len(), 2);
        assert!(!vectors[0].is_empty());
    }
}
