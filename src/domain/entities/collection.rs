use crate::domain::values::metric::Metric;
use serde::{Deserialize, Serialize};

pub const MAX_TEXT_LENGTH: usize = 65_535;
pub const MAX_SHARDS: u32 = 16;
pub const MAX_DIMENSION: usize = 32_768;

/// Where a document's primary key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum PrimaryKey {
    /// Backend assigns an `i64` per row.
    Auto,
    /// Read from this metadata key and stored as a string.
    FromMetadata(String),
}

impl PrimaryKey {
    pub fn is_auto(&self) -> bool {
        matches!(self, PrimaryKey::Auto)
    }
}

/// Layout of a collection: one primary key, one vector field, the text and a JSON metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub primary_key: PrimaryKey,
    pub primary_field: String,
    pub vector_field: String,
    pub text_field: String,
    pub meta_field: String,
    pub dimension: usize,
    pub max_text_length: usize,
    pub shards: u32,
}

impl CollectionSchema {
    /// Checks names and limits. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        validate_name("collection name", &self.name)?;
        let fields = [
            ("primary field", &self.primary_field),
            ("vector field", &self.vector_field),
            ("text field", &self.text_field),
            ("meta field", &self.meta_field),
        ];
        for (what, name) in fields {
            validate_name(what, name)?;
        }
        for (i, (_, a)) in fields.iter().enumerate() {
            if fields[i + 1..].iter().any(|(_, b)| a == b) {
                return Err(format!("Field name {a} is used more than once"));
            }
        }
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(format!(
                "Dimension must be between 1 and {MAX_DIMENSION}, got {}",
                self.dimension
            ));
        }
        if self.max_text_length == 0 || self.max_text_length > MAX_TEXT_LENGTH {
            return Err(format!(
                "Max text length must be between 1 and {MAX_TEXT_LENGTH}, got {}",
                self.max_text_length
            ));
        }
        if self.shards == 0 || self.shards > MAX_SHARDS {
            return Err(format!(
                "Shard count must be between 1 and {MAX_SHARDS}, got {}",
                self.shards
            ));
        }
        if let PrimaryKey::FromMetadata(key) = &self.primary_key {
            if key.is_empty() {
                return Err("Id key must not be empty".into());
            }
        }
        Ok(())
    }
}

/// Identifiers for collections, partitions and fields: `[A-Za-z_][A-Za-z0-9_]*`, at most 255 chars.
pub fn validate_name(what: &str, name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || name.len() > 255 {
        return Err(format!("Invalid {what}: {name:?}"));
    }
    Ok(())
}

/// What the backend reports about an existing collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: Option<usize>,
    /// Metric of the vector field's index, if one exists.
    pub metric: Option<Metric>,
    pub loaded: bool,
}

/// A collection that is provisioned and loaded, ready for reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionHandle {
    pub name: String,
    pub metric: Metric,
    pub created: bool,
}
