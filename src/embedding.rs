//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`DisabledEmbedder`]**: returns errors; used when embeddings are not configured.
//! - **[`OpenAIEmbedder`]**: calls an OpenAI-compatible `/embeddings` endpoint.
//! - **`LocalEmbedder`**: runs a multilingual model locally via fastembed
//!   (`local-embeddings` feature); no network calls after model download.
//!
//! The same embedder instance must serve both the index build and the query
//! embedding, otherwise similarity scores compare vectors from different
//! spaces. [`embed_all`] enforces the configured dimensionality on every
//! vector it returns.
//!
//! Calls are made once; a failed request fails the whole workflow run.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `3072`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per text in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed `texts` in batches of `batch_size`.
///
/// Fails if the provider returns the wrong number of vectors, a vector
/// whose length differs from [`Embedder::dims`], or a NaN/infinite
/// component.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let out = embedder.embed(batch).await?;
        if out.len() != batch.len() {
            bail!(
                "embedding provider returned {} vectors for {} inputs",
                out.len(),
                batch.len()
            );
        }
        for v in &out {
            check_vector(embedder, v)?;
        }
        vectors.extend(out);
    }

    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    let vector = results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))?;
    check_vector(embedder, &vector)?;
    Ok(vector)
}

fn check_vector(embedder: &dyn Embedder, vector: &[f32]) -> Result<()> {
    if vector.len() != embedder.dims() {
        bail!(
            "embedding dimension mismatch for model '{}': expected {}, got {}",
            embedder.model_name(),
            embedder.dims(),
            vector.len()
        );
    }
    // f64 values beyond the f32 range come back from the cast as infinity.
    if vector.iter().any(|x| !x.is_finite()) {
        bail!(
            "embedding from model '{}' contains non-finite values",
            embedder.model_name()
        );
    }
    Ok(())
}

// ============ Disabled Provider ============

/// A no-op embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedder backed by an OpenAI-compatible API.
///
/// Calls `POST {base_url}/embeddings`. The API key is read from
/// `OPENAI_API_KEY` once, at construction.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment or the
    /// HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    /// Build with an explicit key instead of reading the environment.
    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        // Only the text-embedding-3 family accepts a reduced dimensionality.
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dims);
        }
        body
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(texts))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI embeddings API error {}: {}", status, body_text);
        }

        let body = response.text().await?;
        let json: serde_json::Value = serde_json::from_str(&body)
            .context("Invalid OpenAI response: body is not JSON")?;
        parse_openai_response(&json)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;

        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("Invalid OpenAI response: non-numeric embedding value"))
            })
            .collect::<Result<Vec<f32>>>()?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local Provider (fastembed) ============

/// Embedder for local inference with fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached.
/// Only multilingual models are offered, since the policy text is Chinese.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (fastembed_model, dims) = config_to_fastembed_model(&config.model)?;
        if config.dims != dims {
            bail!(
                "embedding.dims = {} does not match local model '{}' ({} dims)",
                config.dims,
                config.model,
                dims
            );
        }
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name: config.model.clone(),
            dims,
            model: Arc::new(std::sync::Mutex::new(model)),
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((fastembed::EmbeddingModel::MultilingualE5Large, 1024)),
        "bge-small-zh-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallZHV15, 512)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, bge-small-zh-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Create the [`Embedder`] selected by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires the `local-embeddings` feature) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, FaqError};
    use axum::http::StatusCode;
    use serde_json::json;

    struct FixedEmbedder {
        dims: usize,
        returned_dims: usize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; self.returned_dims]).collect())
        }
    }

    #[test]
    fn parse_orders_by_index() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn parse_rejects_missing_data() {
        assert!(parse_openai_response(&json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn parse_rejects_non_numeric_values() {
        let json = json!({ "data": [ { "index": 0, "embedding": ["x"] } ] });
        assert!(parse_openai_response(&json).is_err());
    }

    #[test]
    fn request_body_sends_dimensions_for_v3_models() {
        let config = EmbeddingConfig::default();
        let embedder = OpenAIEmbedder::with_api_key(&config, "sk-test".into()).unwrap();
        let body = embedder.request_body(&["保费".to_string()]);
        assert_eq!(body["model"], "text-embedding-3-large");
        assert_eq!(body["dimensions"], 3072);

        let mut config = EmbeddingConfig::default();
        config.model = "text-embedding-ada-002".into();
        let embedder = OpenAIEmbedder::with_api_key(&config, "sk-test".into()).unwrap();
        assert!(embedder.request_body(&[]).get("dimensions").is_none());
    }

    #[tokio::test]
    async fn embed_all_batches_and_checks_dims() {
        let ok = FixedEmbedder {
            dims: 4,
            returned_dims: 4,
        };
        let texts: Vec<String> = (0..7).map(|i| format!("chunk {}", i)).collect();
        let vecs = embed_all(&ok, &texts, 3).await.unwrap();
        assert_eq!(vecs.len(), 7);

        let bad = FixedEmbedder {
            dims: 4,
            returned_dims: 3,
        };
        let err = embed_all(&bad, &texts, 3).await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    struct OverflowEmbedder;

    #[async_trait]
    impl Embedder for OverflowEmbedder {
        fn model_name(&self) -> &str {
            "overflow"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            parse_openai_response(&json!({ "data": [ { "index": 0, "embedding": [1e300, 0.5] } ] }))
        }
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected() {
        let err = embed_query(&OverflowEmbedder, "保费").await.unwrap_err();
        assert!(err.to_string().contains("non-finite"));
        let err = embed_all(&OverflowEmbedder, &["保费".to_string()], 8)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    /// Serve `body` with `status` on every path; returns the `/v1` base URL.
    async fn stub_api(status: StatusCode, body: &'static str) -> String {
        let app = axum::Router::new().fallback(move || async move { (status, body) });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/v1", addr)
    }

    #[tokio::test]
    async fn non_json_body_is_an_indexing_failure() {
        let config = EmbeddingConfig {
            base_url: stub_api(StatusCode::OK, "<html>not json</html>").await,
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAIEmbedder::with_api_key(&config, "sk-test".into()).unwrap();
        let err = embedder.embed(&["保费".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("not JSON"));
        match classify(err, FaqError::IndexingFailure) {
            FaqError::IndexingFailure(_) => {}
            other => panic!("expected indexing failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn disabled_embedder_errors() {
        let err = embed_query(&DisabledEmbedder, "保费").await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
