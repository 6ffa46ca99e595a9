use crate::application::context::CallContext;
use crate::domain::entities::collection::{CollectionHandle, CollectionSchema};
use crate::domain::error::StoreError;
use crate::domain::ports::index_backend::IndexBackend;
use crate::domain::values::index::IndexDescriptor;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Makes sure the collection exists, is indexed and is loaded before use.
pub struct CollectionManager {
    backend: Arc<dyn IndexBackend>,
}

impl CollectionManager {
    pub fn new(backend: Arc<dyn IndexBackend>) -> Self {
        Self { backend }
    }

    /// Create (or with `drop_old`, recreate) the collection, index its vector field and load it.
    ///
    /// An existing collection is reused as-is when `drop_old` is false. A collection
    /// created by this call is dropped again if any later step fails, so it is never
    /// left behind half-provisioned.
    #[instrument(skip_all, fields(collection = %schema.name, drop_old = drop_old))]
    pub async fn ensure(
        &self,
        schema: &CollectionSchema,
        index: &IndexDescriptor,
        drop_old: bool,
        partition: Option<&str>,
        ctx: &CallContext,
    ) -> Result<CollectionHandle, StoreError> {
        let name = schema.name.as_str();
        let mut exists = step(ctx, "has_collection", self.backend.has_collection(name)).await?;

        if drop_old && exists {
            step(ctx, "drop_collection", self.backend.drop_collection(name)).await?;
            info!("dropped existing collection");
            exists = false;
        }

        if exists {
            let info =
                step(ctx, "describe_collection", self.backend.describe_collection(name)).await?;
            let metric = match info.as_ref().and_then(|info| info.metric) {
                Some(actual) if actual != index.metric => {
                    warn!(configured = %index.metric, %actual, "collection index uses a different metric");
                    actual
                }
                Some(actual) => actual,
                None => index.metric,
            };
            if let Some(actual) = info.as_ref().and_then(|info| info.dimension) {
                if actual != schema.dimension {
                    warn!(
                        configured = schema.dimension,
                        actual, "collection vector field has a different dimension"
                    );
                }
            }
            let already_loaded = info.is_some_and(|info| info.loaded);
            self.load_and_partition(name, partition, already_loaded, ctx)
                .await?;
            info!(%metric, "reusing existing collection");
            return Ok(CollectionHandle {
                name: name.to_string(),
                metric,
                created: false,
            });
        }

        step(ctx, "create_collection", self.backend.create_collection(schema)).await?;
        let built = async {
            step(
                ctx,
                "create_index",
                self.backend.create_index(name, &schema.vector_field, index),
            )
            .await?;
            self.load_and_partition(name, partition, false, ctx).await
        }
        .await;

        if let Err(e) = built {
            if let Err(drop_err) = self.backend.drop_collection(name).await {
                warn!(error = %drop_err, "failed to drop partially provisioned collection");
            }
            return Err(e);
        }

        info!(metric = %index.metric, index_type = %index.index_type, "created collection");
        Ok(CollectionHandle {
            name: name.to_string(),
            metric: index.metric,
            created: true,
        })
    }

    /// Use a collection provisioned elsewhere; its metric comes from the backend.
    #[instrument(skip_all, fields(collection = %schema.name))]
    pub async fn attach(
        &self,
        schema: &CollectionSchema,
        partition: Option<&str>,
        ctx: &CallContext,
    ) -> Result<CollectionHandle, StoreError> {
        let name = schema.name.as_str();
        let info = step(ctx, "describe_collection", self.backend.describe_collection(name))
            .await?
            .ok_or_else(|| {
                StoreError::Provisioning(format!(
                    "Collection {name} does not exist and no index is configured to create it"
                ))
            })?;
        let metric = info.metric.ok_or_else(|| {
            StoreError::Provisioning(format!("Collection {name} has no vector index"))
        })?;
        self.load_and_partition(name, partition, info.loaded, ctx)
            .await?;
        Ok(CollectionHandle {
            name: name.to_string(),
            metric,
            created: false,
        })
    }

    async fn load_and_partition(
        &self,
        name: &str,
        partition: Option<&str>,
        already_loaded: bool,
        ctx: &CallContext,
    ) -> Result<(), StoreError> {
        if already_loaded {
            debug!("collection already loaded");
        } else {
            step(ctx, "load_collection", self.backend.load_collection(name)).await?;
        }
        if let Some(partition) = partition {
            if !step(ctx, "has_partition", self.backend.has_partition(name, partition)).await? {
                step(
                    ctx,
                    "create_partition",
                    self.backend.create_partition(name, partition),
                )
                .await?;
                info!(partition, "created partition");
            }
        }
        Ok(())
    }
}

async fn step<T, F>(ctx: &CallContext, stage: &str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, String>>,
{
    ctx.run(stage, async {
        fut.await
            .map_err(|e| StoreError::Provisioning(format!("{stage}: {e}")))
    })
    .await
}
