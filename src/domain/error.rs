use thiserror::Error;

/// Every failure a store operation can surface, tagged by the stage that failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Insert error: {0}")]
    Insert(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Canceled during {0}")]
    Canceled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, StoreError::Canceled(_))
    }
}
