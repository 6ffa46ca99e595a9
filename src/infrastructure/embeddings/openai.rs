use crate::domain::ports::embedding_port::Embedder;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI `/v1/embeddings`, or any server speaking the same protocol.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: Option<usize>,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".to_string());
        Self {
            client: Client::new(),
            api_key,
            dimension: Self::model_dimension(&model),
            model,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    fn model_dimension(model: &str) -> Option<usize> {
        match model {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| format!("OpenAI API error: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("OpenAI API {status}: {body}"));
        }

        let mut result: OpenAiResponse = resp.json().await.map_err(|e| format!("Parse error: {e}"))?;
        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| "OpenAI returned no embedding".to_string())
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
