use crate::application::context::CallContext;
use crate::config::StoreConfig;
use crate::domain::entities::collection::validate_name;
use crate::domain::entities::document::{Document, SearchResult};
use crate::domain::error::StoreError;
use crate::domain::ports::index_backend::{IndexBackend, SearchHit, SearchRequest};
use crate::domain::values::consistency::ConsistencyLevel;
use crate::domain::values::metric::Metric;
use crate::domain::values::score_threshold::ScoreThreshold;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Per-call knobs for a similarity search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    score_threshold: f32,
    consistency: Option<ConsistencyLevel>,
    filter: Option<String>,
    partition: Option<String>,
    include_embeddings: bool,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive minimum normalized score, `0.0..=1.0`. Defaults to 0 (no filtering).
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Overrides the store's consistency level for this call.
    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = Some(level);
        self
    }

    /// Boolean filter expression evaluated by the backend.
    pub fn with_filter(mut self, expr: impl Into<String>) -> Self {
        self.filter = Some(expr.into());
        self
    }

    pub fn with_partition_name(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Return stored vectors on the result documents.
    pub fn with_embeddings(mut self) -> Self {
        self.include_embeddings = true;
        self
    }
}

/// Embeds the query, asks the backend for the top `k`, normalizes and filters scores.
pub struct SearchUseCase {
    backend: Arc<dyn IndexBackend>,
    config: Arc<StoreConfig>,
    metric: Metric,
}

impl SearchUseCase {
    pub fn new(backend: Arc<dyn IndexBackend>, config: Arc<StoreConfig>, metric: Metric) -> Self {
        Self {
            backend,
            config,
            metric,
        }
    }

    #[instrument(skip_all, fields(collection = %self.config.schema().name, k = k))]
    pub async fn execute(
        &self,
        query: &str,
        k: usize,
        options: &SearchOptions,
        ctx: &CallContext,
    ) -> Result<Vec<SearchResult>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidInput("k must be at least 1".into()));
        }
        let threshold =
            ScoreThreshold::new(options.score_threshold).map_err(StoreError::InvalidInput)?;
        let partition = options.partition.as_deref().or(self.config.partition());
        if let Some(p) = partition {
            validate_name("partition name", p).map_err(StoreError::InvalidInput)?;
        }

        let embedder = self.config.embedder();
        let vector = ctx
            .run("embedding", async {
                embedder.embed_query(query).await.map_err(StoreError::Embedding)
            })
            .await?;
        let dim = self.config.dimension();
        if vector.len() != dim {
            return Err(StoreError::Embedding(format!(
                "Query vector has length {}, expected {dim}",
                vector.len()
            )));
        }

        let params = match (self.config.search_params(), self.config.index()) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(index)) => index.default_search_params(k),
            (None, None) => Default::default(),
        };
        let consistency = options
            .consistency
            .unwrap_or_else(|| self.config.consistency());
        let request = SearchRequest {
            schema: self.config.schema(),
            vector: &vector,
            limit: k,
            metric: self.metric,
            consistency,
            params,
            filter: options.filter.as_deref(),
            partition,
            include_vectors: options.include_embeddings,
        };
        let hits = ctx
            .run("search", async {
                self.backend.search(request).await.map_err(StoreError::Search)
            })
            .await?;
        let candidates = hits.len();

        let results = rank(self.metric, threshold, k, hits);
        debug!(candidates, returned = results.len(), threshold = %threshold, %consistency, "searched");
        Ok(results)
    }
}

/// Normalize raw scores, keep those at or above the threshold, best first.
///
/// Ties keep the backend's order.
pub fn rank(
    metric: Metric,
    threshold: ScoreThreshold,
    k: usize,
    hits: Vec<SearchHit>,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .map(|hit| SearchResult {
            score: metric.similarity(hit.raw_score),
            id: hit.id,
            document: Document {
                content: hit.content,
                metadata: hit.metadata,
                embedding: hit.vector,
            },
        })
        .filter(|r| threshold.admits(r.score))
        .collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(k);
    results
}
