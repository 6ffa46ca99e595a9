use crate::domain::error::StoreError;
use crate::domain::ports::embedding_port::Embedder;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Hugging Face text-embeddings-inference server (`POST /embed`).
pub struct TeiEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    batch_size: usize,
    normalize: bool,
    truncate: bool,
    dimension: Option<usize>,
}

#[derive(Serialize)]
struct TeiRequest<'a> {
    inputs: &'a [String],
    normalize: bool,
    truncate: bool,
}

impl TeiEmbedder {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StoreError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            batch_size: 32,
            normalize: true,
            truncate: true,
            dimension: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Inputs per request; matches the server's `max_client_batch_size` default.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let url = format!("{}/embed", self.base_url);
        let mut req = self.client.post(&url).json(&TeiRequest {
            inputs,
            normalize: self.normalize,
            truncate: self.truncate,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| format!("TEI API error: {e}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("TEI API {status}: {body}"));
        }

        let vectors: Vec<Vec<f32>> = resp.json().await.map_err(|e| format!("Parse error: {e}"))?;
        if vectors.len() != inputs.len() {
            return Err(format!(
                "TEI returned {} embeddings for {} inputs",
                vectors.len(),
                inputs.len()
            ));
        }
        Ok(vectors)
    }
}

#[async_trait::async_trait]
impl Embedder for TeiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.request(chunk).await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        self.request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| "TEI returned no embedding".to_string())
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
