use crate::domain::entities::collection::{validate_name, CollectionInfo, CollectionSchema};
use crate::domain::entities::document::DocumentId;
use crate::domain::ports::index_backend::{IndexBackend, InsertRequest, SearchHit, SearchRequest};
use crate::domain::values::index::IndexDescriptor;
use crate::domain::values::metric::Metric;
use crate::infrastructure::sqlite::migrations::{create_data_table, data_table, run_migrations};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::sync::Mutex;
use tracing::debug;

pub const DEFAULT_PARTITION: &str = "_default";

/// Embedded index backend: collections live in SQLite tables and search is a
/// brute-force scan scored with the collection's metric.
///
/// Every read sees every committed write, so all consistency levels behave as `Strong`.
pub struct SqliteIndexBackend {
    conn: Mutex<Connection>,
}

struct CatalogEntry {
    schema: CollectionSchema,
    metric: Option<Metric>,
    loaded: bool,
}

impl SqliteIndexBackend {
    pub fn new(conn: Connection) -> Result<Self, String> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a database file, or `:memory:` for a private in-memory database.
    pub fn open(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("DB error: {e}"))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| format!("WAL error: {e}"))?;
        Self::new(conn)
    }

    fn serialize_vector(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T, String>) -> Result<T, String> {
        let mut conn = self.conn.lock().map_err(|e| e.to_string())?;
        f(&mut conn)
    }

    fn catalog(conn: &Connection, name: &str) -> Result<Option<CatalogEntry>, String> {
        let row = conn
            .query_row(
                "SELECT schema, metric, loaded FROM docvec_collections WHERE name = ?1",
                params![name],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| e.to_string())?;
        let Some((schema, metric, loaded)) = row else {
            return Ok(None);
        };
        let schema: CollectionSchema =
            serde_json::from_str(&schema).map_err(|e| format!("Corrupt schema for {name}: {e}"))?;
        let metric = metric.map(|m| m.parse::<Metric>()).transpose()?;
        Ok(Some(CatalogEntry {
            schema,
            metric,
            loaded,
        }))
    }

    fn require(conn: &Connection, name: &str) -> Result<CatalogEntry, String> {
        Self::catalog(conn, name)?.ok_or_else(|| format!("Collection {name} not found"))
    }

    fn partition_exists(conn: &Connection, collection: &str, partition: &str) -> Result<bool, String> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM docvec_partitions WHERE collection = ?1 AND name = ?2",
                params![collection, partition],
                |r| r.get(0),
            )
            .map_err(|e| e.to_string())?;
        Ok(count > 0)
    }

    fn insert_rows(conn: &mut Connection, request: InsertRequest<'_>) -> Result<Vec<DocumentId>, String> {
        let name = &request.schema.name;
        let entry = Self::require(conn, name)?;
        let schema = &entry.schema;
        let partition = request.partition.unwrap_or(DEFAULT_PARTITION);
        if !Self::partition_exists(conn, name, partition)? {
            return Err(format!("Partition {partition} not found in {name}"));
        }

        let columns = request.columns;
        let rows = columns.len();
        if columns.contents.len() != rows || columns.metadata.len() != rows {
            return Err(format!(
                "Column length mismatch: {rows} vectors, {} contents, {} metadata",
                columns.contents.len(),
                columns.metadata.len()
            ));
        }
        match (&columns.ids, schema.primary_key.is_auto()) {
            (Some(_), true) => {
                return Err(format!("Collection {name} assigns ids; explicit ids not accepted"))
            }
            (None, false) => return Err(format!("Collection {name} requires explicit ids")),
            (Some(ids), false) if ids.len() != rows => {
                return Err(format!("Got {} ids for {rows} rows", ids.len()))
            }
            _ => {}
        }
        for (i, (vector, content)) in columns.vectors.iter().zip(&columns.contents).enumerate() {
            if vector.len() != schema.dimension {
                return Err(format!(
                    "Row {i}: vector dimension {} does not match collection dimension {}",
                    vector.len(),
                    schema.dimension
                ));
            }
            if content.len() > schema.max_text_length {
                return Err(format!(
                    "Row {i}: text length {} exceeds max_length {}",
                    content.len(),
                    schema.max_text_length
                ));
            }
        }

        let table = data_table(name);
        let tx = conn.transaction().map_err(|e| e.to_string())?;
        let mut ids = Vec::with_capacity(rows);
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {table} (doc_id, partition, vector, content, metadata) VALUES (?1, ?2, ?3, ?4, ?5)"
                ))
                .map_err(|e| e.to_string())?;
            for i in 0..rows {
                let doc_id = columns.ids.as_ref().map(|ids| ids[i].clone());
                let metadata = serde_json::to_string(&columns.metadata[i]).map_err(|e| e.to_string())?;
                stmt.execute(params![
                    doc_id,
                    partition,
                    Self::serialize_vector(&columns.vectors[i]),
                    columns.contents[i],
                    metadata
                ])
                .map_err(|e| format!("Failed to insert row {i}: {e}"))?;
                ids.push(match doc_id {
                    Some(id) => DocumentId::Str(id),
                    None => DocumentId::Int(tx.last_insert_rowid()),
                });
            }
        }
        tx.commit().map_err(|e| e.to_string())?;
        Ok(ids)
    }

    fn search_rows(conn: &Connection, request: SearchRequest<'_>) -> Result<Vec<SearchHit>, String> {
        let name = &request.schema.name;
        let entry = Self::require(conn, name)?;
        if !entry.loaded {
            return Err(format!("Collection {name} is not loaded"));
        }
        let metric = entry
            .metric
            .ok_or_else(|| format!("Collection {name} has no index"))?;
        if metric != request.metric {
            return Err(format!(
                "Metric type mismatch: index uses {metric}, search requested {}",
                request.metric
            ));
        }
        if request.filter.is_some() {
            return Err("Filter expressions are not supported by the sqlite backend".into());
        }
        if request.vector.len() != entry.schema.dimension {
            return Err(format!(
                "Query vector dimension {} does not match collection dimension {}",
                request.vector.len(),
                entry.schema.dimension
            ));
        }
        debug!(consistency = %request.consistency, "sqlite search");

        let table = data_table(name);
        let (sql, partition) = match request.partition {
            Some(p) => (
                format!("SELECT pk, doc_id, vector, content, metadata FROM {table} WHERE partition = ?1 ORDER BY pk"),
                Some(p),
            ),
            None => (
                format!("SELECT pk, doc_id, vector, content, metadata FROM {table} ORDER BY pk"),
                None,
            ),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        };
        let rows = match partition {
            Some(p) => stmt.query_map(params![p], map_row),
            None => stmt.query_map([], map_row),
        }
        .map_err(|e| e.to_string())?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

        let mut scored = Vec::with_capacity(rows.len());
        for (pk, doc_id, blob, content, metadata) in rows {
            let stored = Self::deserialize_vector(&blob);
            let raw = metric
                .raw_score(request.vector, &stored)
                .ok_or_else(|| format!("Stored vector {pk} has dimension {}", stored.len()))?;
            scored.push((pk, doc_id, stored, content, metadata, raw));
        }
        if metric.higher_is_closer() {
            scored.sort_by(|a, b| b.5.total_cmp(&a.5));
        } else {
            scored.sort_by(|a, b| a.5.total_cmp(&b.5));
        }
        scored.truncate(request.limit);

        scored
            .into_iter()
            .map(|(pk, doc_id, stored, content, metadata, raw)| {
                let metadata: Map<String, Value> = serde_json::from_str(&metadata)
                    .map_err(|e| format!("Corrupt metadata for row {pk}: {e}"))?;
                Ok(SearchHit {
                    id: match doc_id {
                        Some(id) => DocumentId::Str(id),
                        None => DocumentId::Int(pk),
                    },
                    raw_score: raw,
                    content,
                    metadata,
                    vector: request.include_vectors.then_some(stored),
                })
            })
            .collect()
    }
}

#[async_trait]
impl IndexBackend for SqliteIndexBackend {
    async fn has_collection(&self, name: &str) -> Result<bool, String> {
        self.with_conn(|conn| Ok(Self::catalog(conn, name)?.is_some()))
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionInfo>, String> {
        self.with_conn(|conn| {
            Ok(Self::catalog(conn, name)?.map(|entry| CollectionInfo {
                name: name.to_string(),
                dimension: Some(entry.schema.dimension),
                metric: entry.metric,
                loaded: entry.loaded,
            }))
        })
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), String> {
        schema.validate()?;
        self.with_conn(|conn| {
            if Self::catalog(conn, &schema.name)?.is_some() {
                return Err(format!("Collection {} already exists", schema.name));
            }
            let encoded = serde_json::to_string(schema).map_err(|e| e.to_string())?;
            let tx = conn.transaction().map_err(|e| e.to_string())?;
            tx.execute(
                "INSERT INTO docvec_collections (name, schema) VALUES (?1, ?2)",
                params![schema.name, encoded],
            )
            .map_err(|e| format!("Failed to register collection: {e}"))?;
            tx.execute(
                "INSERT INTO docvec_partitions (collection, name) VALUES (?1, ?2)",
                params![schema.name, DEFAULT_PARTITION],
            )
            .map_err(|e| e.to_string())?;
            create_data_table(&tx, &schema.name)?;
            tx.commit().map_err(|e| e.to_string())
        })
    }

    async fn drop_collection(&self, name: &str) -> Result<(), String> {
        validate_name("collection name", name)?;
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(|e| e.to_string())?;
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", data_table(name)))
                .map_err(|e| e.to_string())?;
            tx.execute("DELETE FROM docvec_partitions WHERE collection = ?1", params![name])
                .map_err(|e| e.to_string())?;
            tx.execute("DELETE FROM docvec_collections WHERE name = ?1", params![name])
                .map_err(|e| e.to_string())?;
            tx.commit().map_err(|e| e.to_string())
        })
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        index: &IndexDescriptor,
    ) -> Result<(), String> {
        self.with_conn(|conn| {
            let entry = Self::require(conn, collection)?;
            if field != entry.schema.vector_field {
                return Err(format!("Field {field} is not the vector field of {collection}"));
            }
            let params = serde_json::to_string(&index.params).map_err(|e| e.to_string())?;
            conn.execute(
                "UPDATE docvec_collections SET metric = ?1, index_type = ?2, index_params = ?3 WHERE name = ?4",
                params![index.metric.as_str(), index.index_type, params, collection],
            )
            .map_err(|e| format!("Failed to create index: {e}"))?;
            Ok(())
        })
    }

    async fn load_collection(&self, name: &str) -> Result<(), String> {
        self.with_conn(|conn| {
            let entry = Self::require(conn, name)?;
            if entry.metric.is_none() {
                return Err(format!("Index not found on collection {name}"));
            }
            conn.execute(
                "UPDATE docvec_collections SET loaded = 1 WHERE name = ?1",
                params![name],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool, String> {
        self.with_conn(|conn| {
            Self::require(conn, collection)?;
            Self::partition_exists(conn, collection, partition)
        })
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<(), String> {
        validate_name("partition name", partition)?;
        self.with_conn(|conn| {
            Self::require(conn, collection)?;
            conn.execute(
                "INSERT INTO docvec_partitions (collection, name) VALUES (?1, ?2)",
                params![collection, partition],
            )
            .map_err(|e| format!("Failed to create partition {partition}: {e}"))?;
            Ok(())
        })
    }

    async fn insert(&self, request: InsertRequest<'_>) -> Result<Vec<DocumentId>, String> {
        self.with_conn(|conn| Self::insert_rows(conn, request))
    }

    async fn flush(&self, collection: &str) -> Result<(), String> {
        self.with_conn(|conn| Self::require(conn, collection).map(|_| ()))
    }

    async fn search(&self, request: SearchRequest<'_>) -> Result<Vec<SearchHit>, String> {
        self.with_conn(|conn| Self::search_rows(conn, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::collection::PrimaryKey;
    use crate::domain::ports::index_backend::InsertColumns;
    use crate::domain::values::consistency::ConsistencyLevel;

    fn schema() -> CollectionSchema {
        CollectionSchema {
            name: "docs".into(),
            description: String::new(),
            primary_key: PrimaryKey::Auto,
            primary_field: "pk".into(),
            vector_field: "vectors".into(),
            text_field: "text".into(),
            meta_field: "meta".into(),
            dimension: 2,
            max_text_length: 64,
            shards: 1,
        }
    }

    async fn provisioned(metric: Metric) -> SqliteIndexBackend {
        let backend = SqliteIndexBackend::open(":memory:").unwrap();
        backend.create_collection(&schema()).await.unwrap();
        backend
            .create_index("docs", "vectors", &IndexDescriptor::flat(metric))
            .await
            .unwrap();
        backend.load_collection("docs").await.unwrap();
        backend
    }

    fn columns(vectors: Vec<Vec<f32>>) -> InsertColumns {
        let n = vectors.len();
        InsertColumns {
            ids: None,
            contents: (0..n).map(|i| format!("doc {i}")).collect(),
            metadata: vec![Map::new(); n],
            vectors,
        }
    }

    fn request<'a>(schema: &'a CollectionSchema, vector: &'a [f32], metric: Metric) -> SearchRequest<'a> {
        SearchRequest {
            schema,
            vector,
            limit: 10,
            metric,
            consistency: ConsistencyLevel::Strong,
            params: Map::new(),
            filter: None,
            partition: None,
            include_vectors: false,
        }
    }

    #[test]
    fn test_vector_blob_round_trip() {
        let v = vec![0.5, -1.25, 3.0];
        let bytes = SqliteIndexBackend::serialize_vector(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(SqliteIndexBackend::deserialize_vector(&bytes), v);
    }

    #[tokio::test]
    async fn test_l2_search_closest_first() {
        let backend = provisioned(Metric::L2).await;
        let schema = schema();
        backend
            .insert(InsertRequest {
                schema: &schema,
                partition: None,
                columns: columns(vec![vec![3.0, 0.0], vec![1.0, 0.0], vec![0.0, 0.0]]),
            })
            .await
            .unwrap();

        let hits = backend.search(request(&schema, &[0.0, 0.0], Metric::L2)).await.unwrap();
        let raw: Vec<f32> = hits.iter().map(|h| h.raw_score).collect();
        assert_eq!(raw, vec![0.0, 1.0, 9.0]);
    }

    #[tokio::test]
    async fn test_insert_is_all_or_nothing() {
        let backend = provisioned(Metric::L2).await;
        let schema = schema();
        let err = backend
            .insert(InsertRequest {
                schema: &schema,
                partition: None,
                columns: columns(vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]),
            })
            .await
            .unwrap_err();
        assert!(err.contains("dimension"));

        let hits = backend.search(request(&schema, &[0.0, 0.0], Metric::L2)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_requires_load_and_matching_metric() {
        let backend = SqliteIndexBackend::open(":memory:").unwrap();
        let schema = schema();
        backend.create_collection(&schema).await.unwrap();
        assert!(backend.load_collection("docs").await.is_err());
        backend
            .create_index("docs", "vectors", &IndexDescriptor::flat(Metric::Cosine))
            .await
            .unwrap();

        let err = backend
            .search(request(&schema, &[1.0, 0.0], Metric::Cosine))
            .await
            .unwrap_err();
        assert!(err.contains("not loaded"));

        backend.load_collection("docs").await.unwrap();
        let err = backend
            .search(request(&schema, &[1.0, 0.0], Metric::L2))
            .await
            .unwrap_err();
        assert!(err.contains("Metric type mismatch"));
    }

    #[tokio::test]
    async fn test_drop_then_recreate() {
        let backend = provisioned(Metric::L2).await;
        backend.drop_collection("docs").await.unwrap();
        assert!(!backend.has_collection("docs").await.unwrap());
        backend.create_collection(&schema()).await.unwrap();
        assert!(backend.has_collection("docs").await.unwrap());
        assert!(backend.has_partition("docs", DEFAULT_PARTITION).await.unwrap());
    }
}
