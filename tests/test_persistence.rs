mod common;

use common::{city_documents, options, KeywordEmbedder, JAPAN_QUERY};
use docvec::application::search::SearchOptions;
use docvec::config::ConnectionConfig;
use docvec::domain::values::metric::Metric;
use docvec::Store;
use std::sync::Arc;

fn sqlite_address(dir: &tempfile::TempDir) -> String {
    format!("sqlite:{}", dir.path().join("docvec.db").display())
}

#[tokio::test]
async fn test_reopened_database_keeps_documents() {
    let dir = tempfile::tempdir().unwrap();
    let address = sqlite_address(&dir);

    {
        let store = Store::connect(
            ConnectionConfig::new(address.clone()),
            options(Arc::new(KeywordEmbedder), Metric::L2),
        )
        .await
        .unwrap();
        store.add_documents(&city_documents()).await.unwrap();
    }

    let store = Store::connect(
        ConnectionConfig::new(address),
        options(Arc::new(KeywordEmbedder), Metric::L2),
    )
    .await
    .unwrap();
    assert!(!store.collection().created);

    let results = store
        .similarity_search(JAPAN_QUERY, 10, SearchOptions::new().with_score_threshold(0.3))
        .await
        .unwrap();
    assert_eq!(results.len(), 6);
}

#[tokio::test]
async fn test_drop_old_on_reopen_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let address = sqlite_address(&dir);

    {
        let store = Store::connect(
            ConnectionConfig::new(address.clone()),
            options(Arc::new(KeywordEmbedder), Metric::Cosine),
        )
        .await
        .unwrap();
        store.add_documents(&city_documents()).await.unwrap();
    }

    let store = Store::connect(
        ConnectionConfig::new(address),
        options(Arc::new(KeywordEmbedder), Metric::Cosine).with_drop_old(),
    )
    .await
    .unwrap();
    assert!(store.collection().created);
    let results = store
        .similarity_search(JAPAN_QUERY, 10, SearchOptions::new())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_conflicting_credentials_rejected() {
    let result = Store::connect(
        ConnectionConfig::new("http://localhost:19530")
            .with_token("root:Milvus")
            .with_credentials("root", "Milvus"),
        options(Arc::new(KeywordEmbedder), Metric::L2),
    )
    .await;
    assert!(matches!(
        result.err(),
        Some(docvec::domain::error::StoreError::Config(_))
    ));
}
