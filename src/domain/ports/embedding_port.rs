/// Turns text into fixed-length vectors.
///
/// `embed_documents` must return exactly one vector per input, in input order.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String>;

    /// Output dimension when known without a network call.
    fn dimension(&self) -> Option<usize> {
        None
    }
}
