//! Shared test helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use docvec::config::StoreOptions;
use docvec::domain::entities::collection::{CollectionInfo, CollectionSchema};
use docvec::domain::entities::document::{Document, DocumentId};
use docvec::domain::ports::embedding_port::Embedder;
use docvec::domain::ports::index_backend::{IndexBackend, InsertRequest, SearchHit, SearchRequest};
use docvec::domain::values::index::IndexDescriptor;
use docvec::domain::values::metric::Metric;
use docvec::infrastructure::sqlite::vector_store::SqliteIndexBackend;
use docvec::Store;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CITIES: [&str; 10] = [
    "Tokyo", "Yokohama", "Osaka", "Nagoya", "Sapporo", "Fukuoka", "Dublin", "Paris", "London",
    "New York",
];

pub const JAPAN_QUERY: &str = "Which of these are cities in Japan";

/// Deterministic 3-dim embeddings: axis 0 is "Japan", axes 1 and 2 are elsewhere.
const KEYWORDS: [(&str, [f32; 3]); 11] = [
    ("tokyo", [1.0, 0.0, 0.0]),
    ("yokohama", [0.9, 0.1, 0.0]),
    ("osaka", [0.8, 0.2, 0.0]),
    ("nagoya", [0.7, 0.3, 0.0]),
    ("sapporo", [0.6, 0.4, 0.0]),
    ("fukuoka", [0.5, 0.5, 0.0]),
    ("dublin", [0.0, 2.0, 0.0]),
    ("paris", [0.0, 2.2, 0.0]),
    ("london", [0.0, 0.0, 2.0]),
    ("new york", [0.0, 0.0, 3.0]),
    ("japan", [1.0, 0.0, 0.0]),
];

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(word, _)| lower.contains(word))
        .map(|(_, v)| v.to_vec())
        .unwrap_or_else(|| vec![0.0; 3])
}

pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(keyword_vector(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(3)
    }
}

/// Records every call; does not report a dimension, so the store has to probe.
#[derive(Default)]
pub struct CountingEmbedder {
    pub document_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(keyword_vector(text))
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Err("embedding service unavailable".into())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, String> {
        Err("embedding service unavailable".into())
    }

    fn dimension(&self) -> Option<usize> {
        Some(3)
    }
}

/// Claims 3 dimensions but produces 4.
pub struct WrongDimensionEmbedder;

#[async_trait]
impl Embedder for WrongDimensionEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, String> {
        Ok(vec![0.5; 4])
    }

    fn dimension(&self) -> Option<usize> {
        Some(3)
    }
}

/// Drops the last vector of every batch.
pub struct ShortBatchEmbedder;

#[async_trait]
impl Embedder for ShortBatchEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| keyword_vector(t)).collect();
        vectors.pop();
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(keyword_vector(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(3)
    }
}

/// Keyword embeddings that take `delay` to arrive.
pub struct SlowEmbedder {
    pub delay: Duration,
}

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        tokio::time::sleep(self.delay).await;
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        tokio::time::sleep(self.delay).await;
        Ok(keyword_vector(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(3)
    }
}

/// SQLite backend that fails the named operations and logs every call.
pub struct FlakyBackend {
    inner: SqliteIndexBackend,
    failing: Mutex<HashSet<&'static str>>,
    insert_delay: Mutex<Duration>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            inner: memory_backend(),
            failing: Mutex::new(HashSet::new()),
            insert_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Hold every insert for `delay` before it reaches SQLite.
    pub fn delay_insert(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = delay;
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    fn enter(&self, operation: &'static str) -> Result<(), String> {
        self.calls.lock().unwrap().push(operation);
        if self.failing.lock().unwrap().contains(operation) {
            return Err(format!("injected {operation} failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexBackend for FlakyBackend {
    async fn has_collection(&self, name: &str) -> Result<bool, String> {
        self.enter("has_collection")?;
        self.inner.has_collection(name).await
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>, String> {
        self.enter("describe_collection")?;
        self.inner.describe_collection(name).await
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), String> {
        self.enter("create_collection")?;
        self.inner.create_collection(schema).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), String> {
        self.enter("drop_collection")?;
        self.inner.drop_collection(name).await
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index: &IndexDescriptor,
    ) -> Result<(), String> {
        self.enter("create_index")?;
        self.inner.create_index(collection, field, index).await
    }

    async fn load_collection(&self, name: &str) -> Result<(), String> {
        self.enter("load_collection")?;
        self.inner.load_collection(name).await
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool, String> {
        self.enter("has_partition")?;
        self.inner.has_partition(collection, partition).await
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<(), String> {
        self.enter("create_partition")?;
        self.inner.create_partition(collection, partition).await
    }

    async fn insert(&self, request: InsertRequest<'_>) -> Result<Vec<DocumentId>, String> {
        self.enter("insert")?;
        let delay = *self.insert_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.insert(request).await
    }

    async fn flush(&self, collection: &str) -> Result<(), String> {
        self.enter("flush")?;
        self.inner.flush(collection).await
    }

    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<SearchHit>, String> {
        self.enter("search")?;
        self.inner.search(request).await
    }
}

pub fn memory_backend() -> SqliteIndexBackend {
    SqliteIndexBackend::open(":memory:").unwrap()
}

pub fn options(embedder: Arc<dyn Embedder>, metric: Metric) -> StoreOptions {
    StoreOptions::new()
        .with_embedder(embedder)
        .with_index(IndexDescriptor::flat(metric))
        .with_collection_name("cities")
}

/// A fresh in-memory store with keyword embeddings.
pub async fn setup(metric: Metric) -> Store {
    Store::with_backend(
        Arc::new(memory_backend()),
        options(Arc::new(KeywordEmbedder), metric),
    )
    .await
    .unwrap()
}

pub fn city_documents() -> Vec<Document> {
    CITIES
        .iter()
        .map(|city| Document::new(*city).with_metadata("city", *city))
        .collect()
}
