use crate::domain::entities::collection::{CollectionInfo, CollectionSchema};
use crate::domain::entities::document::DocumentId;
use crate::domain::values::consistency::ConsistencyLevel;
use crate::domain::values::index::IndexDescriptor;
use crate::domain::values::metric::Metric;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Parallel columns for one batch insert. Row `i` of every column belongs together.
#[derive(Debug, Clone, Default)]
pub struct InsertColumns {
    /// Present only when the schema takes caller-supplied keys.
    pub ids: Option<Vec<String>>,
    pub vectors: Vec<Vec<f32>>,
    pub contents: Vec<String>,
    pub metadata: Vec<Map<String, Value>>,
}

impl InsertColumns {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[derive(Debug)]
pub struct InsertRequest<'a> {
    pub schema: &'a CollectionSchema,
    pub partition: Option<&'a str>,
    pub columns: InsertColumns,
}

#[derive(Debug)]
pub struct SearchRequest<'a> {
    pub schema: &'a CollectionSchema,
    pub vector: &'a [f32],
    pub limit: usize,
    pub metric: Metric,
    pub consistency: ConsistencyLevel,
    pub params: Map<String, Value>,
    pub filter: Option<&'a str>,
    pub partition: Option<&'a str>,
    pub include_vectors: bool,
}

/// One ranked candidate exactly as the backend reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: DocumentId,
    /// Raw distance or similarity; interpretation depends on the metric.
    pub raw_score: f32,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub vector: Option<Vec<f32>>,
}

/// Collection management, insert and nearest-neighbour search on a vector index service.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    async fn has_collection(&self, name: &str) -> Result<bool, String>;
    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>, String>;
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), String>;
    async fn drop_collection(&self, name: &str) -> Result<(), String>;
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index: &IndexDescriptor,
    ) -> Result<(), String>;
    async fn load_collection(&self, name: &str) -> Result<(), String>;
    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool, String>;
    async fn create_partition(&self, collection: &str, partition: &str) -> Result<(), String>;
    /// Inserts every row or none; returns ids in row order.
    async fn insert(&self, request: InsertRequest<'_>) -> Result<Vec<DocumentId>, String>;
    async fn flush(&self, collection: &str) -> Result<(), String>;
    /// Top `limit` hits, closest first.
    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<SearchHit>, String>;
}
