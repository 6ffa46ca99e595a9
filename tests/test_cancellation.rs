mod common;

use common::{
    city_documents, memory_backend, options, CountingEmbedder, FlakyBackend, KeywordEmbedder,
    SlowEmbedder,
};
use docvec::application::context::CallContext;
use docvec::application::search::SearchOptions;
use docvec::domain::error::StoreError;
use docvec::domain::ports::index_backend::IndexBackend;
use docvec::domain::values::metric::Metric;
use docvec::{CancellationToken, Store};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_cancel_before_add_skips_embedding() {
    let embedder = Arc::new(CountingEmbedder::default());
    let store = Store::with_backend(
        Arc::new(memory_backend()),
        options(embedder.clone(), Metric::L2).with_dimension(3),
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let ctx = CallContext::background().with_cancellation(token);
    let err = store
        .add_documents_with_context(&city_documents(), &ctx)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(embedder.document_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_during_embedding_leaves_nothing_visible() {
    let backend = Arc::new(FlakyBackend::new());
    let store = Store::with_backend(
        backend.clone(),
        options(
            Arc::new(SlowEmbedder {
                delay: Duration::from_millis(300),
            }),
            Metric::L2,
        ),
    )
    .await
    .unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let ctx = CallContext::background().with_cancellation(token);
    let err = store
        .add_documents_with_context(&city_documents(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Canceled(ref stage) if stage == "embedding"));
    assert_eq!(backend.count("insert"), 0);

    let results = store
        .similarity_search("Tokyo", 10, SearchOptions::new())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_cancel_during_insert_completes_the_batch() {
    let backend = Arc::new(FlakyBackend::new());
    let store = Store::with_backend(
        backend.clone(),
        options(Arc::new(KeywordEmbedder), Metric::L2),
    )
    .await
    .unwrap();
    backend.delay_insert(Duration::from_millis(200));

    let token = CancellationToken::new();
    let canceller = token.clone();
    let watcher = backend.clone();
    tokio::spawn(async move {
        while watcher.count("insert") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        canceller.cancel();
    });

    let ctx = CallContext::background().with_cancellation(token.clone());
    let ids = store
        .add_documents_with_context(&city_documents(), &ctx)
        .await
        .unwrap();
    assert!(token.is_cancelled());
    assert_eq!(ids.len(), 10);

    let results = store
        .similarity_search("Tokyo", 100, SearchOptions::new())
        .await
        .unwrap();
    assert_eq!(results.len(), 10);
}

#[tokio::test]
async fn test_add_deadline_exceeded() {
    let backend = Arc::new(FlakyBackend::new());
    let store = Store::with_backend(
        backend.clone(),
        options(
            Arc::new(SlowEmbedder {
                delay: Duration::from_millis(300),
            }),
            Metric::L2,
        ),
    )
    .await
    .unwrap();

    let ctx = CallContext::background().with_timeout(Duration::from_millis(20));
    let err = store
        .add_documents_with_context(&city_documents(), &ctx)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(backend.count("insert"), 0);
}

#[tokio::test]
async fn test_search_deadline_exceeded() {
    let store = Store::with_backend(
        Arc::new(memory_backend()),
        options(
            Arc::new(SlowEmbedder {
                delay: Duration::from_millis(300),
            }),
            Metric::L2,
        ),
    )
    .await
    .unwrap();

    let ctx = CallContext::background().with_timeout(Duration::from_millis(20));
    let err = store
        .similarity_search_with_context("Tokyo", 5, SearchOptions::new(), &ctx)
        .await
        .unwrap_err();
    assert!(err.is_canceled());
}

#[tokio::test]
async fn test_uncancelled_context_completes() {
    let store = Store::with_backend(
        Arc::new(memory_backend()),
        options(Arc::new(KeywordEmbedder), Metric::L2),
    )
    .await
    .unwrap();

    let ctx = CallContext::background()
        .with_cancellation(CancellationToken::new())
        .with_timeout(Duration::from_secs(5));
    let ids = store
        .add_documents_with_context(&city_documents(), &ctx)
        .await
        .unwrap();
    assert_eq!(ids.len(), 10);

    let results = store
        .similarity_search_with_context("Tokyo", 10, SearchOptions::new(), &ctx)
        .await
        .unwrap();
    assert_eq!(results.len(), 10);
}

#[tokio::test]
async fn test_cancelled_provisioning_creates_nothing() {
    let backend = Arc::new(FlakyBackend::new());
    let token = CancellationToken::new();
    token.cancel();
    let ctx = CallContext::background().with_cancellation(token);

    let result = Store::with_backend_and_context(
        backend.clone(),
        options(Arc::new(KeywordEmbedder), Metric::L2),
        &ctx,
    )
    .await;
    assert!(result.err().is_some_and(|e| e.is_canceled()));
    assert_eq!(backend.count("create_collection"), 0);
    assert!(!backend.has_collection("cities").await.unwrap());
}
