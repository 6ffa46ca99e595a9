//! JSON shapes of the Milvus RESTful v2 API.

use crate::domain::entities::collection::{CollectionInfo, CollectionSchema, PrimaryKey};
use crate::domain::entities::document::DocumentId;
use crate::domain::ports::index_backend::{InsertRequest, SearchHit, SearchRequest};
use crate::domain::values::index::IndexDescriptor;
use crate::domain::values::metric::Metric;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Max length of a caller-supplied VarChar primary key.
pub const ID_MAX_LENGTH: usize = 512;
pub const LOAD_STATE_LOADED: &str = "LoadStateLoaded";

/// Every Milvus response is wrapped in `{code, message, data}`; `code` 0 means success.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn into_data(self, path: &str) -> Result<Value, String> {
        // v1 endpoints reported success as 200.
        if self.code == 0 || self.code == 200 {
            Ok(self.data)
        } else {
            Err(format!(
                "Milvus {path} failed with code {}: {}",
                self.code,
                self.message.unwrap_or_default()
            ))
        }
    }
}

pub fn create_collection_body(schema: &CollectionSchema) -> Value {
    let primary = match &schema.primary_key {
        PrimaryKey::Auto => json!({
            "fieldName": schema.primary_field,
            "dataType": "Int64",
            "isPrimary": true,
        }),
        PrimaryKey::FromMetadata(_) => json!({
            "fieldName": schema.primary_field,
            "dataType": "VarChar",
            "isPrimary": true,
            "elementTypeParams": { "max_length": ID_MAX_LENGTH },
        }),
    };
    json!({
        "collectionName": schema.name,
        "description": schema.description,
        "schema": {
            "autoId": schema.primary_key.is_auto(),
            "enableDynamicField": false,
            "fields": [
                primary,
                {
                    "fieldName": schema.vector_field,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": schema.dimension.to_string() },
                },
                {
                    "fieldName": schema.text_field,
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": schema.max_text_length },
                },
                {
                    "fieldName": schema.meta_field,
                    "dataType": "JSON",
                },
            ],
        },
        "params": { "shardsNum": schema.shards },
    })
}

pub fn create_index_body(collection: &str, field: &str, index: &IndexDescriptor) -> Value {
    let mut params = index.params.clone();
    params.insert("index_type".into(), json!(index.index_type));
    json!({
        "collectionName": collection,
        "indexParams": [{
            "fieldName": field,
            "indexName": format!("{field}_idx"),
            "metricType": index.metric.as_str(),
            "indexType": index.index_type,
            "params": params,
        }],
    })
}

pub fn insert_body(request: &InsertRequest<'_>) -> Value {
    let schema = request.schema;
    let columns = &request.columns;
    let rows: Vec<Value> = (0..columns.len())
        .map(|i| {
            let mut row = Map::new();
            if let Some(ids) = &columns.ids {
                row.insert(schema.primary_field.clone(), json!(ids[i]));
            }
            row.insert(schema.vector_field.clone(), json!(columns.vectors[i]));
            row.insert(schema.text_field.clone(), json!(columns.contents[i]));
            row.insert(
                schema.meta_field.clone(),
                Value::Object(columns.metadata[i].clone()),
            );
            Value::Object(row)
        })
        .collect();

    let mut body = json!({
        "collectionName": schema.name,
        "data": rows,
    });
    if let Some(partition) = request.partition {
        body["partitionName"] = json!(partition);
    }
    body
}

pub fn search_body(request: &SearchRequest<'_>) -> Value {
    let schema = request.schema;
    let mut output_fields = vec![
        schema.primary_field.clone(),
        schema.text_field.clone(),
        schema.meta_field.clone(),
    ];
    if request.include_vectors {
        output_fields.push(schema.vector_field.clone());
    }

    let mut body = json!({
        "collectionName": schema.name,
        "data": [request.vector],
        "annsField": schema.vector_field,
        "limit": request.limit,
        "outputFields": output_fields,
        "searchParams": {
            "metricType": request.metric.as_str(),
            "params": request.params,
        },
        "consistencyLevel": request.consistency.as_str(),
    });
    if let Some(filter) = request.filter {
        body["filter"] = json!(filter);
    }
    if let Some(partition) = request.partition {
        body["partitionNames"] = json!([partition]);
    }
    body
}

pub fn parse_has(data: &Value) -> Result<bool, String> {
    data.get("has")
        .and_then(Value::as_bool)
        .ok_or_else(|| format!("Missing `has` in response: {data}"))
}

pub fn parse_insert_ids(data: &Value) -> Result<Vec<DocumentId>, String> {
    let ids = data
        .get("insertIds")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("Missing `insertIds` in insert response: {data}"))?;
    ids.iter()
        .map(|v| DocumentId::from_json(v).ok_or_else(|| format!("Unexpected id value: {v}")))
        .collect()
}

pub fn parse_describe(name: &str, data: &Value) -> CollectionInfo {
    let fields = data
        .get("fields")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let vector = fields
        .iter()
        .find(|f| f.get("type").and_then(Value::as_str) == Some("FloatVector"));
    let vector_name = vector.and_then(|f| f.get("name")).and_then(Value::as_str);
    let dimension = vector
        .and_then(|f| f.get("params"))
        .and_then(Value::as_array)
        .and_then(|params| {
            params
                .iter()
                .find(|p| p.get("key").and_then(Value::as_str) == Some("dim"))
        })
        .and_then(|p| p.get("value"))
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            _ => None,
        });
    let metric = data
        .get("indexes")
        .and_then(Value::as_array)
        .and_then(|indexes| {
            indexes.iter().find(|idx| {
                vector_name.is_none() || idx.get("fieldName").and_then(Value::as_str) == vector_name
            })
        })
        .and_then(|idx| idx.get("metricType"))
        .and_then(Value::as_str)
        .and_then(|m| m.parse::<Metric>().ok());
    let loaded = data.get("load").and_then(Value::as_str) == Some(LOAD_STATE_LOADED);

    CollectionInfo {
        name: name.to_string(),
        dimension,
        metric,
        loaded,
    }
}

pub fn parse_search_hits(
    data: Value,
    schema: &CollectionSchema,
    include_vectors: bool,
) -> Result<Vec<SearchHit>, String> {
    let Value::Array(hits) = data else {
        return Err(format!("Expected an array of hits, got {data}"));
    };
    hits.into_iter()
        .enumerate()
        .map(|(i, hit)| {
            let Value::Object(mut hit) = hit else {
                return Err(format!("Hit {i} is not an object"));
            };
            let id = hit
                .get(&schema.primary_field)
                .or_else(|| hit.get("id"))
                .and_then(DocumentId::from_json)
                .ok_or_else(|| format!("Hit {i} has no primary key"))?;
            let raw_score = hit
                .get("distance")
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("Hit {i} has no distance"))? as f32;
            let content = match hit.remove(&schema.text_field) {
                Some(Value::String(s)) => s,
                _ => return Err(format!("Hit {i} has no {} field", schema.text_field)),
            };
            let metadata = match hit.remove(&schema.meta_field) {
                Some(Value::Object(m)) => m,
                // Some server versions return JSON fields as encoded strings.
                Some(Value::String(s)) => serde_json::from_str(&s)
                    .map_err(|e| format!("Hit {i} has malformed metadata: {e}"))?,
                Some(Value::Null) | None => Map::new(),
                Some(other) => return Err(format!("Hit {i} metadata is not an object: {other}")),
            };
            let vector = if include_vectors {
                hit.remove(&schema.vector_field)
                    .map(serde_json::from_value::<Vec<f32>>)
                    .transpose()
                    .map_err(|e| format!("Hit {i} has malformed vector: {e}"))?
            } else {
                None
            };
            Ok(SearchHit {
                id,
                raw_score,
                content,
                metadata,
                vector,
            })
        })
        .collect()
}
