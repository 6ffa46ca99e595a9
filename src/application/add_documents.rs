use crate::application::context::CallContext;
use crate::config::StoreConfig;
use crate::domain::entities::collection::PrimaryKey;
use crate::domain::entities::document::{Document, DocumentId};
use crate::domain::error::StoreError;
use crate::domain::ports::index_backend::{IndexBackend, InsertColumns, InsertRequest};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Embeds a batch of documents with one embedder call and writes it with one insert.
pub struct AddDocumentsUseCase {
    backend: Arc<dyn IndexBackend>,
    config: Arc<StoreConfig>,
}

impl AddDocumentsUseCase {
    pub fn new(backend: Arc<dyn IndexBackend>, config: Arc<StoreConfig>) -> Self {
        Self { backend, config }
    }

    /// Returns one id per document, in input order.
    ///
    /// Cancellation is honoured until the insert is issued. After that the call
    /// runs to completion, so a canceled add never leaves rows behind.
    #[instrument(skip_all, fields(collection = %self.config.schema().name, count = documents.len()))]
    pub async fn execute(
        &self,
        documents: &[Document],
        ctx: &CallContext,
    ) -> Result<Vec<DocumentId>, StoreError> {
        if documents.is_empty() {
            return Err(StoreError::InvalidInput(
                "Cannot add an empty batch of documents".into(),
            ));
        }
        let schema = self.config.schema();

        for (i, doc) in documents.iter().enumerate() {
            if doc.content.len() > schema.max_text_length {
                return Err(StoreError::InvalidInput(format!(
                    "Document {i} content is {} bytes, limit is {}",
                    doc.content.len(),
                    schema.max_text_length
                )));
            }
        }
        let ids = match &schema.primary_key {
            PrimaryKey::Auto => None,
            PrimaryKey::FromMetadata(key) => Some(
                documents
                    .iter()
                    .enumerate()
                    .map(|(i, doc)| document_key(doc, key, i))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        let contents: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embedder = self.config.embedder();
        let vectors = ctx
            .run("embedding", async {
                embedder
                    .embed_documents(&contents)
                    .await
                    .map_err(StoreError::Embedding)
            })
            .await?;
        self.check_vectors(&vectors, documents.len())?;
        debug!("embedded batch");

        // Last point at which the add can still be abandoned without side effects.
        ctx.check("insert")?;

        let request = InsertRequest {
            schema,
            partition: self.config.partition(),
            columns: InsertColumns {
                ids,
                vectors,
                contents,
                metadata: documents.iter().map(|d| d.metadata.clone()).collect(),
            },
        };
        let inserted = self
            .backend
            .insert(request)
            .await
            .map_err(StoreError::Insert)?;
        if inserted.len() != documents.len() {
            return Err(StoreError::Insert(format!(
                "Backend returned {} ids for {} documents",
                inserted.len(),
                documents.len()
            )));
        }

        // The rows are committed; a failed flush only delays when sealed segments see them.
        if !self.config.skip_flush_on_write() {
            if let Err(e) = self.backend.flush(&schema.name).await {
                warn!(error = %e, "flush after insert failed");
            }
        }

        info!(inserted = inserted.len(), "added documents");
        Ok(inserted)
    }

    fn check_vectors(&self, vectors: &[Vec<f32>], expected: usize) -> Result<(), StoreError> {
        if vectors.len() != expected {
            return Err(StoreError::Embedding(format!(
                "Embedder returned {} vectors for {expected} documents",
                vectors.len()
            )));
        }
        let dim = self.config.dimension();
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(StoreError::Embedding(format!(
                "Vector {i} has length {}, expected {dim}",
                v.len()
            )));
        }
        Ok(())
    }
}

fn document_key(doc: &Document, key: &str, index: usize) -> Result<String, StoreError> {
    match doc.metadata.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StoreError::InvalidInput(format!(
            "Document {index} has no usable id under metadata key {key}"
        ))),
    }
}
