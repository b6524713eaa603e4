use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rise_core::config::{LlmConfig, LlmProvider, VectorStoreConfig};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::OPENAI_DEFAULT_BASE_URL;

pub const PAGE_CONTENT_KEY: &str = "page_content";
pub const DENSE_VECTOR_NAME: &str = "dense";

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub page_content: String,
    pub metadata: Value,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("vector store request failed: {0}")]
    Store(String),
    #[error("vector store client misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similarity_search(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Document>, RetrievalError>;
}

/// `POST {base}/embeddings` against an OpenAI-compatible server.
pub struct OpenAiEmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiEmbeddingClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, RetrievalError> {
        let base_url = match (&config.base_url, config.provider) {
            (Some(base_url), _) => base_url.clone(),
            (None, LlmProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => {
                return Err(RetrievalError::Configuration(
                    "ollama embeddings require llm.base_url".to_string(),
                ))
            }
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RetrievalError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut request =
            self.http.post(&self.endpoint).json(&json!({ "model": self.model, "input": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Embedding(format!("status={status}: {}", body.trim())));
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| RetrievalError::Embedding(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|datum| datum.embedding)
            .ok_or_else(|| RetrievalError::Embedding("response contained no embeddings".to_string()))
    }
}

/// Dense search over a Qdrant collection through its REST API.
pub struct QdrantStore {
    http: reqwest::Client,
    search_endpoint: String,
    api_key: Option<SecretString>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl QdrantStore {
    pub fn new(
        config: &VectorStoreConfig,
        collection: &str,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Result<Self, RetrievalError> {
        if collection.trim().is_empty() {
            return Err(RetrievalError::Configuration("collection name is required".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RetrievalError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            search_endpoint: format!(
                "{}/collections/{}/points/search",
                config.url.trim_end_matches('/'),
                collection
            ),
            api_key: config.api_key.clone(),
            embedder,
        })
    }

    pub fn search_endpoint(&self) -> &str {
        &self.search_endpoint
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn similarity_search(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Document>, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        let body = json!({
            "vector": { "name": DENSE_VECTOR_NAME, "vector": vector },
            "limit": limit,
            "with_payload": true,
        });

        let mut request = self.http.post(&self.search_endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key.expose_secret());
        }

        let response = request.send().await.map_err(|e| RetrievalError::Store(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Store(format!("status={status}: {}", body.trim())));
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|e| RetrievalError::Store(e.to_string()))?;
        Ok(parsed.result.into_iter().filter_map(|point| point.payload.and_then(document_from_payload)).collect())
    }
}

fn document_from_payload(mut payload: serde_json::Map<String, Value>) -> Option<Document> {
    let page_content = match payload.remove(PAGE_CONTENT_KEY)? {
        Value::String(text) => text,
        _ => return None,
    };
    let metadata = payload.remove("metadata").unwrap_or_else(|| Value::Object(payload));
    Some(Document { page_content, metadata })
}

/// Joins retrieved passages the way they are handed to the model.
pub fn join_documents(documents: &[Document]) -> String {
    documents.iter().map(|doc| doc.page_content.as_str()).collect::<Vec<_>>().join("\n\n")
}
