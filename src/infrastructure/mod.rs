pub mod embeddings;
pub mod milvus;
pub mod sqlite;
