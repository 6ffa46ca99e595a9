use crate::config::ConnectionConfig;
use crate::domain::entities::collection::{CollectionInfo, CollectionSchema};
use crate::domain::entities::document::DocumentId;
use crate::domain::error::StoreError;
use crate::domain::ports::index_backend::{IndexBackend, InsertRequest, SearchHit, SearchRequest};
use crate::domain::values::index::IndexDescriptor;
use crate::infrastructure::milvus::wire::{self, Envelope, LOAD_STATE_LOADED};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Milvus over its RESTful v2 API (`/v2/vectordb/...`).
pub struct MilvusClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    database: Option<String>,
    load_poll_interval: Duration,
    load_timeout: Duration,
}

impl MilvusClient {
    pub fn new(connection: &ConnectionConfig) -> Result<Self, StoreError> {
        connection.validate()?;
        let client = Client::builder()
            .timeout(connection.timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("HTTP client error: {e}")))?;
        Ok(Self {
            client,
            base_url: connection.address.trim_end_matches('/').to_string(),
            token: connection.bearer_token(),
            database: connection.database.clone(),
            load_poll_interval: Duration::from_millis(500),
            load_timeout: Duration::from_secs(120),
        })
    }

    /// How often and how long `load_collection` waits for the load to finish.
    pub fn with_load_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.load_poll_interval = interval;
        self.load_timeout = timeout;
        self
    }

    async fn post(&self, path: &str, mut body: Value) -> Result<Value, String> {
        if let (Some(db), Value::Object(map)) = (&self.database, &mut body) {
            map.insert("dbName".into(), json!(db));
        }
        let url = format!("{}/v2/vectordb/{path}", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| format!("Milvus API error on {path}: {e}"))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Milvus API {path} {status}: {body}"));
        }
        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| format!("Parse error on {path}: {e}"))?;
        envelope.into_data(path)
    }

    async fn load_state(&self, name: &str) -> Result<String, String> {
        let data = self
            .post(
                "collections/get_load_state",
                json!({ "collectionName": name }),
            )
            .await?;
        data.get("loadState")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("Missing `loadState` in response: {data}"))
    }
}

#[async_trait]
impl IndexBackend for MilvusClient {
    async fn has_collection(&self, name: &str) -> Result<bool, String> {
        let data = self
            .post("collections/has", json!({ "collectionName": name }))
            .await?;
        wire::parse_has(&data)
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>, String> {
        if !self.has_collection(name).await? {
            return Ok(None);
        }
        let data = self
            .post("collections/describe", json!({ "collectionName": name }))
            .await?;
        Ok(Some(wire::parse_describe(name, &data)))
    }

    #[instrument(skip_all, fields(collection = %schema.name))]
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), String> {
        self.post("collections/create", wire::create_collection_body(schema))
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), String> {
        self.post("collections/drop", json!({ "collectionName": name }))
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(collection = %collection, index_type = %index.index_type))]
    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index: &IndexDescriptor,
    ) -> Result<(), String> {
        self.post(
            "indexes/create",
            wire::create_index_body(collection, field, index),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_collection(&self, name: &str) -> Result<(), String> {
        self.post("collections/load", json!({ "collectionName": name }))
            .await?;
        let deadline = Instant::now() + self.load_timeout;
        loop {
            let state = self.load_state(name).await?;
            if state == LOAD_STATE_LOADED {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "Collection {name} not loaded after {:?} (state {state})",
                    self.load_timeout
                ));
            }
            debug!(%state, "waiting for collection load");
            tokio::time::sleep(self.load_poll_interval).await;
        }
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool, String> {
        let data = self
            .post(
                "partitions/has",
                json!({ "collectionName": collection, "partitionName": partition }),
            )
            .await?;
        wire::parse_has(&data)
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<(), String> {
        self.post(
            "partitions/create",
            json!({ "collectionName": collection, "partitionName": partition }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(collection = %request.schema.name, rows = request.columns.len()))]
    async fn insert(&self, request: InsertRequest<'_>) -> Result<Vec<DocumentId>, String> {
        let data = self
            .post("entities/insert", wire::insert_body(&request))
            .await?;
        wire::parse_insert_ids(&data)
    }

    async fn flush(&self, collection: &str) -> Result<(), String> {
        self.post("collections/flush", json!({ "collectionName": collection }))
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(collection = %request.schema.name, limit = request.limit))]
    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<SearchHit>, String> {
        let data = self
            .post("entities/search", wire::search_body(&request))
            .await?;
        wire::parse_search_hits(data, request.schema, request.include_vectors)
    }
}
