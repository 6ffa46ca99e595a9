pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

use crate::application::add_documents::AddDocumentsUseCase;
use crate::application::context::CallContext;
use crate::application::provision::CollectionManager;
use crate::application::search::{SearchOptions, SearchUseCase};
use crate::config::{ConnectionConfig, EmbeddingProviderKind, Settings, StoreConfig, StoreOptions};
use crate::domain::entities::collection::CollectionHandle;
use crate::domain::entities::document::{Document, DocumentId, SearchResult};
use crate::domain::error::StoreError;
use crate::domain::ports::embedding_port::Embedder;
use crate::domain::ports::index_backend::IndexBackend;
use crate::domain::values::metric::Metric;
use crate::infrastructure::embeddings::openai::OpenAiEmbedder;
use crate::infrastructure::embeddings::tei::TeiEmbedder;
use crate::infrastructure::milvus::client::MilvusClient;
use crate::infrastructure::sqlite::vector_store::SqliteIndexBackend;
use std::sync::Arc;
use tracing::info;

pub use crate::application::context::CancellationToken;

/// A provisioned collection plus the embedder that feeds it.
///
/// Configuration is fixed at construction; `Store` is `Send + Sync` and may be
/// shared across tasks without locking.
pub struct Store {
    config: Arc<StoreConfig>,
    collection: CollectionHandle,
    add_documents_uc: AddDocumentsUseCase,
    search_uc: SearchUseCase,
}

impl Store {
    /// Connect to the backend named by `connection` and provision the collection.
    pub async fn connect(
        connection: ConnectionConfig,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        connection.validate()?;
        let backend: Arc<dyn IndexBackend> = match connection.sqlite_path() {
            Some(path) => Arc::new(SqliteIndexBackend::open(path).map_err(StoreError::Config)?),
            None => Arc::new(MilvusClient::new(&connection)?),
        };
        info!(address = %connection.address, "connected to index backend");
        Self::with_backend(backend, options).await
    }

    pub async fn with_backend(
        backend: Arc<dyn IndexBackend>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        Self::with_backend_and_context(backend, options, &CallContext::background()).await
    }

    pub async fn with_backend_and_context(
        backend: Arc<dyn IndexBackend>,
        options: StoreOptions,
        ctx: &CallContext,
    ) -> Result<Self, StoreError> {
        options.validate()?;
        let dimension = resolve_dimension(&options, ctx).await?;
        let config = Arc::new(options.build(dimension)?);

        let manager = CollectionManager::new(backend.clone());
        let collection = match config.index() {
            Some(index) => {
                manager
                    .ensure(config.schema(), index, config.drop_old(), config.partition(), ctx)
                    .await?
            }
            None => manager.attach(config.schema(), config.partition(), ctx).await?,
        };

        Ok(Self {
            add_documents_uc: AddDocumentsUseCase::new(backend.clone(), config.clone()),
            search_uc: SearchUseCase::new(backend, config.clone(), collection.metric),
            config,
            collection,
        })
    }

    pub async fn add_documents(&self, documents: &[Document]) -> Result<Vec<DocumentId>, StoreError> {
        self.add_documents_uc
            .execute(documents, &CallContext::background())
            .await
    }

    pub async fn add_documents_with_context(
        &self,
        documents: &[Document],
        ctx: &CallContext,
    ) -> Result<Vec<DocumentId>, StoreError> {
        self.add_documents_uc.execute(documents, ctx).await
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.search_uc
            .execute(query, k, &options, &CallContext::background())
            .await
    }

    pub async fn similarity_search_with_context(
        &self,
        query: &str,
        k: usize,
        options: SearchOptions,
        ctx: &CallContext,
    ) -> Result<Vec<SearchResult>, StoreError> {
        self.search_uc.execute(query, k, &options, ctx).await
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    pub fn metric(&self) -> Metric {
        self.collection.metric
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension()
    }
}

/// Options for the embedder and index named by `DOCVEC_*` settings.
pub fn store_options(settings: &Settings) -> Result<StoreOptions, StoreError> {
    let embedding = &settings.embedding;
    let embedder: Arc<dyn Embedder> = match embedding.provider {
        EmbeddingProviderKind::Tei => {
            let url = embedding.url.clone().ok_or_else(|| {
                StoreError::Config("DOCVEC_EMBEDDING_URL is required for the tei provider".into())
            })?;
            let mut tei = TeiEmbedder::new(url)?;
            if !embedding.api_key.is_empty() {
                tei = tei.with_api_key(embedding.api_key.clone());
            }
            Arc::new(tei)
        }
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiEmbedder::new(
            embedding.api_key.clone(),
            embedding.model.clone(),
            embedding.url.clone(),
        )),
    };

    let mut options = StoreOptions::new()
        .with_embedder(embedder)
        .with_index(settings.index())
        .with_collection_name(settings.collection.clone())
        .with_consistency_level(settings.consistency);
    if let Some(dim) = embedding.dimension {
        options = options.with_dimension(dim);
    }
    Ok(options)
}

/// Explicit option first, then what the embedder reports, then one probe embedding.
async fn resolve_dimension(options: &StoreOptions, ctx: &CallContext) -> Result<usize, StoreError> {
    let embedder = options
        .embedder()
        .ok_or_else(|| StoreError::Config("An embedder is required (with_embedder)".into()))?;
    if let Some(dim) = options.dimension().or_else(|| embedder.dimension()) {
        return Ok(dim);
    }
    let probe = ctx
        .run("dimension probe", async {
            embedder
                .embed_query("dimension probe")
                .await
                .map_err(StoreError::Embedding)
        })
        .await?;
    if probe.is_empty() {
        return Err(StoreError::Embedding(
            "Embedder returned an empty vector for the dimension probe".into(),
        ));
    }
    Ok(probe.len())
}
