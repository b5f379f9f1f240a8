mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use memsift::retrieval::{
    CandidateSource, RetrievalError, RetrievalRequest, ScoringWeights, Source, SqliteLexicalIndex,
    SqliteVectorIndex,
};

fn seeded_db() -> TestDb {
    let mut db = test_db();
    insert(&mut db, "u1", "User lives in Paris", &axis(1), 2);
    insert(&mut db, "u1", "User visited Paris last year", &axis(1), 400);
    insert(&mut db, "u1", "Likes green tea", &axis(2), 10);
    db
}

#[tokio::test]
async fn vector_timeout_degrades_to_lexical() {
    let db = seeded_db();
    let mut config = test_config();
    config.vector_timeout_ms = 30;
    let retriever = retriever_with(
        Arc::new(StubEmbedder::new()),
        Arc::new(FaultyIndex::slow(Duration::from_secs(5))),
        Arc::new(SqliteLexicalIndex::new(db.connect())),
        &config,
    );

    let resp = retriever
        .retrieve(RetrievalRequest::new("where does the user live", "u1"))
        .await
        .unwrap();

    assert!(resp.partial);
    assert_eq!(resp.degraded, Some(Source::Vector));
    assert_eq!(resp.results.len(), 2);
    assert!(resp
        .results
        .iter()
        .all(|r| r.source == CandidateSource::Lexical));

    // vector_score counts as 0, so nothing can exceed the other two weights
    let w = ScoringWeights::default();
    assert!(resp
        .results
        .iter()
        .all(|r| r.final_score <= w.w_lexical + w.w_recency + 1e-9));
    assert!(resp.results[0].final_score >= resp.results[1].final_score);
}

#[tokio::test]
async fn lexical_failure_degrades_to_vector() {
    let db = seeded_db();
    let retriever = retriever_with(
        Arc::new(StubEmbedder::new().with("tea", axis(2))),
        Arc::new(SqliteVectorIndex::new(db.connect())),
        Arc::new(FaultyIndex::failing()),
        &test_config(),
    );

    let resp = retriever
        .retrieve(RetrievalRequest::new("tea", "u1"))
        .await
        .unwrap();
    assert!(resp.partial);
    assert_eq!(resp.degraded, Some(Source::Lexical));
    assert_eq!(resp.results[0].source, CandidateSource::Vector);
    assert_eq!(resp.results[0].text, "Likes green tea");
}

#[tokio::test]
async fn both_sources_failing_is_unavailable() {
    let mut config = test_config();
    config.vector_timeout_ms = 20;
    let retriever = retriever_with(
        Arc::new(StubEmbedder::new()),
        Arc::new(FaultyIndex::slow(Duration::from_secs(5))),
        Arc::new(FaultyIndex::failing()),
        &config,
    );

    let err = retriever
        .retrieve(RetrievalRequest::new("anything", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::RetrievalUnavailable(_)));
}

#[tokio::test]
async fn embedding_outage_is_retried_once() {
    let db = seeded_db();
    let embedder = Arc::new(StubEmbedder::new().failing(1));
    let retriever = sqlite_retriever(&db, embedder.clone());

    let resp = retriever
        .retrieve(RetrievalRequest::new("tea", "u1"))
        .await
        .unwrap();
    assert!(!resp.results.is_empty());
    assert_eq!(embedder.call_count(), 2);
}

#[tokio::test]
async fn persistent_embedding_outage_is_unavailable() {
    let db = seeded_db();
    let embedder = Arc::new(StubEmbedder::new().failing(usize::MAX));
    let retriever = sqlite_retriever(&db, embedder.clone());

    let err = retriever
        .retrieve(RetrievalRequest::new("tea", "u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::RetrievalUnavailable(_)));
    assert_eq!(embedder.call_count(), 2);
}

#[tokio::test]
async fn cancelled_retrieve_stops_both_searches() {
    let vector = Arc::new(FaultyIndex::slow(Duration::from_millis(200)));
    let lexical = Arc::new(FaultyIndex::slow(Duration::from_millis(200)));
    let (vector_done, lexical_done) = (vector.finished.clone(), lexical.finished.clone());

    let mut config = test_config();
    config.vector_timeout_ms = 5_000;
    config.lexical_timeout_ms = 5_000;
    let retriever = retriever_with(Arc::new(StubEmbedder::new()), vector, lexical, &config);

    // the caller gives up long before either search finishes
    let outcome = tokio::time::timeout(
        Duration::from_millis(30),
        retriever.retrieve(RetrievalRequest::new("anything", "u1")),
    )
    .await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!vector_done.load(Ordering::SeqCst));
    assert!(!lexical_done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn concurrent_identical_queries_agree() {
    let db = seeded_db();
    let retriever = Arc::new(sqlite_retriever(&db, Arc::new(StubEmbedder::new())));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let r = Arc::clone(&retriever);
            tokio::spawn(async move {
                r.retrieve(RetrievalRequest::new("paris", "u1").top_k(3))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut responses = Vec::new();
    for h in handles {
        responses.push(h.await.unwrap());
    }
    assert!(responses.windows(2).all(|w| w[0] == w[1]));
}
