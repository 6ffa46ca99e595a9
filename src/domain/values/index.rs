use crate::domain::values::metric::Metric;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const AUTOINDEX: &str = "AUTOINDEX";
pub const FLAT: &str = "FLAT";
pub const HNSW: &str = "HNSW";
pub const IVF_FLAT: &str = "IVF_FLAT";

/// How the vector field of a collection is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub metric: Metric,
    pub index_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl IndexDescriptor {
    pub fn new(metric: Metric, index_type: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            metric,
            index_type: index_type.into().to_uppercase(),
            params,
        }
    }

    /// Let the backend pick index parameters.
    pub fn auto(metric: Metric) -> Self {
        Self::new(metric, AUTOINDEX, Map::new())
    }

    /// Exhaustive scan, exact results.
    pub fn flat(metric: Metric) -> Self {
        Self::new(metric, FLAT, Map::new())
    }

    pub fn hnsw(metric: Metric, m: u32, ef_construction: u32) -> Self {
        let mut params = Map::new();
        params.insert("M".into(), json!(m));
        params.insert("efConstruction".into(), json!(ef_construction));
        Self::new(metric, HNSW, params)
    }

    pub fn ivf_flat(metric: Metric, nlist: u32) -> Self {
        let mut params = Map::new();
        params.insert("nlist".into(), json!(nlist));
        Self::new(metric, IVF_FLAT, params)
    }

    /// Search-time parameters the index needs for a top-`k` query.
    ///
    /// HNSW requires `ef >= k`; IVF indexes probe a fixed number of lists.
    pub fn default_search_params(&self, k: usize) -> Map<String, Value> {
        let mut params = Map::new();
        if self.index_type == HNSW {
            params.insert("ef".into(), json!(k.max(64)));
        } else if self.index_type.starts_with("IVF") {
            params.insert("nprobe".into(), json!(16));
        }
        params
    }
}
