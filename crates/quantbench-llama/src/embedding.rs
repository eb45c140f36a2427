//! Sentence embeddings over an OpenAI-compatible HTTP endpoint

use crate::http_client;
use quantbench_core::{backend::Embedder, BenchError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where to find the embedding model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL; `/v1/embeddings` is appended
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8090".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn first_embedding(response: EmbeddingResponse) -> Result<Vec<f32>> {
    response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| {
            BenchError::embedding(
                "EMBEDDING_EMPTY",
                "Embedding response contained no vector",
                "Parsing /v1/embeddings response",
                "Check that the endpoint serves an embedding model",
            )
        })
}

/// Embedder backed by `POST {endpoint}/v1/embeddings`
pub struct HttpEmbedder {
    url: String,
    model: String,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            url: format!("{}/v1/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            client: http_client(Some(Duration::from_secs(config.timeout_secs)))?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request_error = |e: reqwest::Error| {
            BenchError::embedding(
                "EMBEDDING_REQUEST_FAILED",
                format!("Embedding request failed: {}", e),
                format!("POST {}", self.url),
                "Check that the embedding server is running",
            )
        };

        let response: EmbeddingResponse = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(request_error)?
            .json()
            .map_err(request_error)?;
        first_embedding(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_endpoint() {
        let embedder = HttpEmbedder::new(&EmbeddingConfig {
            endpoint: "http://localhost:9000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(embedder.url(), "http://localhost:9000/v1/embeddings");
    }

    #[test]
    fn test_response_parsing() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2,0.3]}],"model":"m"}"#,
        )
        .unwrap();
        assert_eq!(first_embedding(response).unwrap(), vec![0.1, 0.2, 0.3]);

        let empty: EmbeddingResponse = serde_json::from_str(r#"{"data":[]}"#).unwrap();
        assert_eq!(first_embedding(empty).unwrap_err().code(), "EMBEDDING_EMPTY");
    }

    #[test]
    fn test_request_shape() {
        let value = serde_json::to_value(EmbeddingRequest {
            model: "all-MiniLM-L6-v2",
            input: "Paris",
        })
        .unwrap();
        assert_eq!(value["input"], "Paris");
        assert_eq!(value["model"], "all-MiniLM-L6-v2");
    }
}
