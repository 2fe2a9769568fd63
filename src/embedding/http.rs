//! OpenAI-compatible `/embeddings` client.

use super::Embedder;
use crate::cancel::CancelToken;
use crate::config::EndpointConfig;
use crate::llm::{HttpTransport, ReqwestTransport};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Embedder backed by a remote endpoint.
pub struct HttpEmbedder {
    transport: Arc<dyn HttpTransport>,
    model: String,
    timeout: Duration,
    max_response_bytes: usize,
}

impl HttpEmbedder {
    /// Creates an embedder over an arbitrary transport.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
            timeout: Duration::from_secs(30),
            max_response_bytes: 1024 * 1024,
        }
    }

    /// Creates an embedder from an endpoint configuration.
    #[must_use]
    pub fn from_endpoint(endpoint: &EndpointConfig) -> Self {
        let mut embedder = Self::new(
            Arc::new(ReqwestTransport::from_endpoint(endpoint)),
            endpoint.model.clone(),
        );
        embedder.timeout = endpoint.timeout;
        embedder.max_response_bytes = endpoint.max_response_bytes;
        embedder
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Vec<f32>> {
        let body = json!({ "model": self.model, "input": text });
        let bytes = self.transport.post_json(
            "/embeddings",
            &body,
            self.timeout,
            self.max_response_bytes,
            cancel,
        )?;
        let response: EmbeddingResponse =
            serde_json::from_slice(&bytes).map_err(|e| Error::Transport {
                operation: "embeddings".to_string(),
                cause: format!("invalid response: {e}"),
            })?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Transport {
                operation: "embeddings".to_string(),
                cause: "empty embedding".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct Canned(&'static str);

    impl HttpTransport for Canned {
        fn post_json(
            &self,
            path: &str,
            body: &Value,
            _timeout: Duration,
            _max_bytes: usize,
            _cancel: &CancelToken,
        ) -> Result<Vec<u8>> {
            assert_eq!(path, "/embeddings");
            assert_eq!(body["input"], "hello");
            Ok(self.0.as_bytes().to_vec())
        }
    }

    #[test]
    fn test_takes_first_vector() {
        let embedder = HttpEmbedder::new(
            Arc::new(Canned(r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[9.0]}]}"#)),
            "e1",
        );
        let vector = embedder.embed("hello", &CancelToken::new()).unwrap();
        assert_eq!(vector, vec![0.1, 0.2]);
        assert_eq!(embedder.model_id(), "e1");
    }

    #[test]
    fn test_empty_vector_fails() {
        let embedder = HttpEmbedder::new(Arc::new(Canned(r#"{"data":[{"embedding":[]}]}"#)), "e1");
        let err = embedder.embed("hello", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
