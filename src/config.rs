//! Construction-time configuration.
//!
//! [`StoreOptions`] collects named options, [`StoreOptions::build`] validates
//! them into an immutable [`StoreConfig`]. [`ConnectionConfig`] describes how
//! to reach the index backend and [`Settings`] reads both from the environment.

use crate::domain::entities::collection::{
    validate_name, CollectionSchema, PrimaryKey, MAX_TEXT_LENGTH,
};
use crate::domain::error::StoreError;
use crate::domain::ports::embedding_port::Embedder;
use crate::domain::values::consistency::ConsistencyLevel;
use crate::domain::values::index::IndexDescriptor;
use crate::domain::values::metric::Metric;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "docvec_documents";
pub const DEFAULT_PRIMARY_FIELD: &str = "pk";
pub const DEFAULT_VECTOR_FIELD: &str = "vectors";
pub const DEFAULT_TEXT_FIELD: &str = "text";
pub const DEFAULT_META_FIELD: &str = "meta";

#[derive(Clone)]
pub struct StoreOptions {
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<IndexDescriptor>,
    drop_old: bool,
    collection_name: String,
    description: String,
    partition: Option<String>,
    primary_field: String,
    vector_field: String,
    text_field: String,
    meta_field: String,
    id_key: Option<String>,
    max_text_length: usize,
    shards: u32,
    dimension: Option<usize>,
    consistency: ConsistencyLevel,
    search_params: Option<Map<String, Value>>,
    skip_flush_on_write: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            embedder: None,
            index: None,
            drop_old: false,
            collection_name: DEFAULT_COLLECTION.into(),
            description: String::new(),
            partition: None,
            primary_field: DEFAULT_PRIMARY_FIELD.into(),
            vector_field: DEFAULT_VECTOR_FIELD.into(),
            text_field: DEFAULT_TEXT_FIELD.into(),
            meta_field: DEFAULT_META_FIELD.into(),
            id_key: None,
            max_text_length: MAX_TEXT_LENGTH,
            shards: 1,
            dimension: None,
            consistency: ConsistencyLevel::default(),
            search_params: None,
            skip_flush_on_write: false,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Index for the vector field. Enables auto-provisioning of the collection.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.index = Some(index);
        self
    }

    /// Drop any existing collection of the same name before provisioning.
    pub fn with_drop_old(mut self) -> Self {
        self.drop_old = true;
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection_name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_partition_name(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_primary_field(mut self, field: impl Into<String>) -> Self {
        self.primary_field = field.into();
        self
    }

    pub fn with_vector_field(mut self, field: impl Into<String>) -> Self {
        self.vector_field = field.into();
        self
    }

    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }

    pub fn with_meta_field(mut self, field: impl Into<String>) -> Self {
        self.meta_field = field.into();
        self
    }

    /// Use `metadata[key]` as the document id instead of a backend auto id.
    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.id_key = Some(key.into());
        self
    }

    pub fn with_max_text_length(mut self, max: usize) -> Self {
        self.max_text_length = max;
        self
    }

    pub fn with_shards(mut self, shards: u32) -> Self {
        self.shards = shards;
        self
    }

    /// Skip probing the embedder for its output dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency = level;
        self
    }

    /// Search params sent with every query, replacing the index defaults.
    pub fn with_search_params(mut self, params: Map<String, Value>) -> Self {
        self.search_params = Some(params);
        self
    }

    pub fn with_skip_flush_on_write(mut self) -> Self {
        self.skip_flush_on_write = true;
        self
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Checks everything that does not depend on the embedding dimension.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.embedder.is_none() {
            return Err(StoreError::Config(
                "An embedder is required (with_embedder)".into(),
            ));
        }
        if self.drop_old && self.index.is_none() {
            return Err(StoreError::Config(
                "with_drop_old requires with_index to recreate the collection".into(),
            ));
        }
        if let Some(partition) = &self.partition {
            validate_name("partition name", partition).map_err(StoreError::Config)?;
        }
        if self.dimension == Some(0) {
            return Err(StoreError::Config("Dimension must be at least 1".into()));
        }
        Ok(())
    }

    /// Freeze the options into a [`StoreConfig`] for vectors of length `dimension`.
    pub fn build(self, dimension: usize) -> Result<StoreConfig, StoreError> {
        self.validate()?;
        if let Some(expected) = self.dimension {
            if expected != dimension {
                return Err(StoreError::Config(format!(
                    "Configured dimension {expected} does not match resolved dimension {dimension}"
                )));
            }
        }

        let primary_key = match self.id_key {
            Some(key) => PrimaryKey::FromMetadata(key),
            None => PrimaryKey::Auto,
        };
        let schema = CollectionSchema {
            name: self.collection_name,
            description: self.description,
            primary_key,
            primary_field: self.primary_field,
            vector_field: self.vector_field,
            text_field: self.text_field,
            meta_field: self.meta_field,
            dimension,
            max_text_length: self.max_text_length,
            shards: self.shards,
        };
        schema.validate().map_err(StoreError::Config)?;

        let embedder = self
            .embedder
            .ok_or_else(|| StoreError::Config("An embedder is required (with_embedder)".into()))?;

        Ok(StoreConfig {
            embedder,
            schema,
            index: self.index,
            drop_old: self.drop_old,
            partition: self.partition,
            consistency: self.consistency,
            search_params: self.search_params,
            skip_flush_on_write: self.skip_flush_on_write,
        })
    }
}

/// Validated, read-only configuration owned by one store.
#[derive(Clone)]
pub struct StoreConfig {
    embedder: Arc<dyn Embedder>,
    schema: CollectionSchema,
    index: Option<IndexDescriptor>,
    drop_old: bool,
    partition: Option<String>,
    consistency: ConsistencyLevel,
    search_params: Option<Map<String, Value>>,
    skip_flush_on_write: bool,
}

impl StoreConfig {
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn index(&self) -> Option<&IndexDescriptor> {
        self.index.as_ref()
    }

    pub fn drop_old(&self) -> bool {
        self.drop_old
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    pub fn search_params(&self) -> Option<&Map<String, Value>> {
        self.search_params.as_ref()
    }

    pub fn skip_flush_on_write(&self) -> bool {
        self.skip_flush_on_write
    }

    pub fn dimension(&self) -> usize {
        self.schema.dimension
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("schema", &self.schema)
            .field("index", &self.index)
            .field("drop_old", &self.drop_old)
            .field("partition", &self.partition)
            .field("consistency", &self.consistency)
            .field("search_params", &self.search_params)
            .field("skip_flush_on_write", &self.skip_flush_on_write)
            .finish_non_exhaustive()
    }
}

/// How to reach the index backend.
///
/// `address` is either an HTTP(S) URL of a Milvus server or `sqlite:<path>`
/// for the embedded backend (`sqlite::memory:` for a throwaway store).
#[derive(Clone)]
pub struct ConnectionConfig {
    pub address: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            username: None,
            password: None,
            database: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Path of the embedded backend when the address uses the `sqlite:` scheme.
    pub fn sqlite_path(&self) -> Option<&str> {
        self.address.strip_prefix("sqlite:")
    }

    /// Bearer token sent to the server: the API token or `user:password`.
    pub fn bearer_token(&self) -> Option<String> {
        match (&self.token, &self.username, &self.password) {
            (Some(token), _, _) => Some(token.clone()),
            (None, Some(user), Some(pass)) => Some(format!("{user}:{pass}")),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.address.trim().is_empty() {
            return Err(StoreError::Config("Connection address is required".into()));
        }
        if self.token.is_some() && self.username.is_some() {
            return Err(StoreError::Config(
                "Use either a token or username/password, not both".into(),
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(StoreError::Config(
                "Username and password must be given together".into(),
            ));
        }
        if self.sqlite_path().is_none()
            && !(self.address.starts_with("http://") || self.address.starts_with("https://"))
        {
            return Err(StoreError::Config(format!(
                "Unsupported address {}: expected http(s):// or sqlite:",
                self.address
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Which embedding service the binary talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Tei,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub url: Option<String>,
    pub api_key: String,
    pub model: Option<String>,
    pub dimension: Option<usize>,
}

/// Everything the CLI needs, read from `DOCVEC_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub collection: String,
    pub metric: Metric,
    pub index_type: String,
    pub consistency: ConsistencyLevel,
    pub embedding: EmbeddingSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mut connection =
            ConnectionConfig::new(var("DOCVEC_URL").unwrap_or_else(|| "sqlite:./docvec.db".into()));
        if let Some(token) = var("DOCVEC_TOKEN") {
            connection = connection.with_token(token);
        }
        connection.username = var("DOCVEC_USER");
        connection.password = var("DOCVEC_PASSWORD");
        connection.database = var("DOCVEC_DATABASE");
        connection.validate()?;

        let metric = match var("DOCVEC_METRIC") {
            Some(m) => m.parse().map_err(StoreError::Config)?,
            None => Metric::L2,
        };
        let consistency = match var("DOCVEC_CONSISTENCY") {
            Some(c) => c.parse().map_err(StoreError::Config)?,
            None => ConsistencyLevel::default(),
        };
        let provider = match var("DOCVEC_EMBEDDING_PROVIDER").as_deref() {
            None | Some("tei") => EmbeddingProviderKind::Tei,
            Some("openai") => EmbeddingProviderKind::OpenAi,
            Some(other) => {
                return Err(StoreError::Config(format!(
                    "Unknown embedding provider: {other}"
                )))
            }
        };
        let dimension = match var("DOCVEC_EMBEDDING_DIM") {
            Some(d) => Some(d.parse::<usize>().map_err(|e| {
                StoreError::Config(format!("DOCVEC_EMBEDDING_DIM must be an integer: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            connection,
            collection: var("DOCVEC_COLLECTION").unwrap_or_else(|| DEFAULT_COLLECTION.into()),
            metric,
            index_type: var("DOCVEC_INDEX_TYPE").unwrap_or_else(|| "AUTOINDEX".into()),
            consistency,
            embedding: EmbeddingSettings {
                provider,
                url: var("DOCVEC_EMBEDDING_URL"),
                api_key: var("DOCVEC_EMBEDDING_API_KEY").unwrap_or_default(),
                model: var("DOCVEC_EMBEDDING_MODEL"),
                dimension,
            },
        })
    }

    pub fn index(&self) -> IndexDescriptor {
        IndexDescriptor::new(self.metric, self.index_type.clone(), Map::new())
    }
}
