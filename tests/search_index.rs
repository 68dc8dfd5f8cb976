//! Storage and similarity-search behavior against real in-memory SQLite.
//!
//! Covers eligibility (only `completed` documents are searchable), ranking
//! and top-k truncation, subject filtering, batch atomicity, and cascade
//! deletion.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use study_harness::documents::{self, DocumentFilters};
use study_harness::embedding::l2_normalize;
use study_harness::migrate::apply_schema;
use study_harness::models::{Chunk, DocumentStatus};
use study_harness::search::{Retriever, SqliteIndex};
use study_harness::{conversations, models};

// ============ Fixtures ============

fn unit(mut v: Vec<f32>) -> Vec<f32> {
    l2_normalize(&mut v);
    v
}

/// A single-connection in-memory database; more than one connection would
/// each see its own empty :memory: database.
async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    apply_schema(&pool).await.unwrap();
    pool
}

async fn seed_document(pool: &SqlitePool, filename: &str, subject: Option<&str>) -> String {
    documents::create_document(pool, filename, subject, 1024, "application/pdf")
        .await
        .unwrap()
}

async fn complete(pool: &SqlitePool, document_id: &str) {
    assert!(
        documents::update_status(pool, document_id, DocumentStatus::Completed, None)
            .await
            .unwrap()
    );
}

fn chunk(document_id: &str, index: i64, content: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: format!("{}-{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        content: content.to_string(),
        embedding: unit(embedding),
        metadata_json: "{}".to_string(),
        hash: format!("hash-{}", index),
    }
}

// ============ Eligibility ============

#[tokio::test]
async fn only_completed_documents_are_searchable() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let done = seed_document(&pool, "done.pdf", None).await;
    let pending = seed_document(&pool, "pending.pdf", None).await;
    let failed = seed_document(&pool, "failed.pdf", None).await;

    complete(&pool, &done).await;
    documents::update_status(&pool, &failed, DocumentStatus::Failed, Some("boom"))
        .await
        .unwrap();

    // All three documents have an embedded chunk identical to the query.
    let query = unit(vec![1.0, 0.0, 0.0]);
    for id in [&done, &pending, &failed] {
        index
            .create_batch(&[chunk(id, 0, "text", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
    }

    let hits = index.search(&query, 10, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, done);
    assert_eq!(hits[0].filename, "done.pdf");
}

#[tokio::test]
async fn fewer_eligible_chunks_than_top_k_is_not_an_error() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "short.pdf", None).await;
    complete(&pool, &doc).await;
    index
        .create_batch(&[
            chunk(&doc, 0, "a", vec![1.0, 0.0, 0.0]),
            chunk(&doc, 1, "b", vec![0.9, 0.1, 0.0]),
            chunk(&doc, 2, "c", vec![0.0, 1.0, 0.0]),
        ])
        .await
        .unwrap();

    let query = unit(vec![1.0, 0.0, 0.0]);
    let hits = index.search(&query, 5, None).await.unwrap();
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn empty_index_returns_no_hits() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());
    let hits = index.search(&unit(vec![1.0, 0.0, 0.0]), 5, None).await.unwrap();
    assert!(hits.is_empty());
}

// ============ Ranking ============

#[tokio::test]
async fn hits_are_ranked_by_descending_similarity() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "notes.pdf", None).await;
    complete(&pool, &doc).await;
    // Inserted in worst-to-best order so ranking cannot ride on rowid.
    index
        .create_batch(&[
            chunk(&doc, 0, "orthogonal", vec![0.0, 1.0, 0.0]),
            chunk(&doc, 1, "close", vec![0.9, 0.4, 0.0]),
            chunk(&doc, 2, "exact", vec![1.0, 0.0, 0.0]),
        ])
        .await
        .unwrap();

    let query = unit(vec![1.0, 0.0, 0.0]);
    let hits = index.search(&query, 3, None).await.unwrap();

    let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
    assert_eq!(contents, vec!["exact", "close", "orthogonal"]);
    assert!(hits[0].similarity >= hits[1].similarity);
    assert!(hits[1].similarity >= hits[2].similarity);
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn tied_scores_keep_insertion_order() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "notes.pdf", None).await;
    complete(&pool, &doc).await;
    // Identical vectors: every pair ties exactly.
    index
        .create_batch(&[
            chunk(&doc, 0, "first", vec![1.0, 0.0, 0.0]),
            chunk(&doc, 1, "second", vec![1.0, 0.0, 0.0]),
            chunk(&doc, 2, "third", vec![1.0, 0.0, 0.0]),
        ])
        .await
        .unwrap();

    let query = unit(vec![1.0, 0.0, 0.0]);
    let hits = index.search(&query, 3, None).await.unwrap();
    let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn top_k_truncates_after_ranking() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "notes.pdf", None).await;
    complete(&pool, &doc).await;
    let batch: Vec<Chunk> = (0..10)
        .map(|i| {
            // Similarity to the query falls as i grows.
            chunk(&doc, i, &format!("c{}", i), vec![1.0, i as f32 * 0.3, 0.0])
        })
        .collect();
    index.create_batch(&batch).await.unwrap();

    let query = unit(vec![1.0, 0.0, 0.0]);
    let hits = index.search(&query, 4, None).await.unwrap();
    let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
    assert_eq!(contents, vec!["c0", "c1", "c2", "c3"]);
}

// ============ Subject filter ============

#[tokio::test]
async fn subject_filter_is_exact_match() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let math = seed_document(&pool, "math.pdf", Some("数学")).await;
    let mech = seed_document(&pool, "mech.pdf", Some("物理(力学)")).await;
    let untagged = seed_document(&pool, "misc.pdf", None).await;
    for id in [&math, &mech, &untagged] {
        complete(&pool, id).await;
        index
            .create_batch(&[chunk(id, 0, "text", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
    }

    let query = unit(vec![1.0, 0.0, 0.0]);

    let hits = index.search(&query, 10, Some("数学")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, math);

    // A prefix of a stored tag matches nothing.
    let hits = index.search(&query, 10, Some("物理")).await.unwrap();
    assert!(hits.is_empty());

    // No filter: everything eligible surfaces.
    let hits = index.search(&query, 10, None).await.unwrap();
    assert_eq!(hits.len(), 3);
}

// ============ Batch atomicity ============

#[tokio::test]
async fn duplicate_index_in_batch_leaves_nothing_behind() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "dup.pdf", None).await;
    let batch = vec![
        chunk(&doc, 0, "a", vec![1.0, 0.0, 0.0]),
        chunk(&doc, 1, "b", vec![0.0, 1.0, 0.0]),
        // Violates UNIQUE(document_id, chunk_index).
        chunk(&doc, 1, "b again", vec![0.0, 0.0, 1.0]),
    ];

    assert!(index.create_batch(&batch).await.is_err());
    assert_eq!(index.count_by_document(&doc).await.unwrap(), 0);
}

#[tokio::test]
async fn batch_for_unknown_document_is_rejected() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    // Foreign key enforcement: the owning document row must exist.
    let batch = vec![chunk("no-such-document", 0, "a", vec![1.0, 0.0, 0.0])];
    assert!(index.create_batch(&batch).await.is_err());
}

// ============ Document lifecycle ============

#[tokio::test]
async fn deleting_a_document_cascades_to_its_chunks() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "gone.pdf", None).await;
    complete(&pool, &doc).await;
    index
        .create_batch(&[
            chunk(&doc, 0, "a", vec![1.0, 0.0, 0.0]),
            chunk(&doc, 1, "b", vec![0.0, 1.0, 0.0]),
        ])
        .await
        .unwrap();
    assert_eq!(index.count_by_document(&doc).await.unwrap(), 2);

    assert!(documents::delete_document(&pool, &doc).await.unwrap());
    assert_eq!(index.count_by_document(&doc).await.unwrap(), 0);
    assert!(documents::get_document(&pool, &doc).await.unwrap().is_none());

    // Deleting again reports not-found.
    assert!(!documents::delete_document(&pool, &doc).await.unwrap());
}

#[tokio::test]
async fn listing_filters_by_status_and_subject() {
    let pool = memory_pool().await;

    let math = seed_document(&pool, "math.pdf", Some("数学")).await;
    let phys = seed_document(&pool, "phys.pdf", Some("物理(力学)")).await;
    let _pending = seed_document(&pool, "pending.pdf", Some("数学")).await;
    complete(&pool, &math).await;
    complete(&pool, &phys).await;

    let completed = DocumentFilters {
        status: Some(DocumentStatus::Completed),
        subject: None,
    };
    assert_eq!(documents::count_documents(&pool, &completed).await.unwrap(), 2);

    let completed_math = DocumentFilters {
        status: Some(DocumentStatus::Completed),
        subject: Some("数学".to_string()),
    };
    let listings = documents::list_documents(&pool, &completed_math, 50, 0).await.unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].document.id, math);
    assert_eq!(listings[0].document.filename, "math.pdf");

    assert_eq!(
        documents::count_documents(&pool, &DocumentFilters::default())
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn listing_reports_chunk_counts() {
    let pool = memory_pool().await;
    let index = SqliteIndex::new(pool.clone());

    let doc = seed_document(&pool, "counted.pdf", None).await;
    complete(&pool, &doc).await;
    index
        .create_batch(&[
            chunk(&doc, 0, "a", vec![1.0, 0.0, 0.0]),
            chunk(&doc, 1, "b", vec![0.0, 1.0, 0.0]),
            chunk(&doc, 2, "c", vec![0.0, 0.0, 1.0]),
        ])
        .await
        .unwrap();

    let listings = documents::list_documents(&pool, &DocumentFilters::default(), 50, 0)
        .await
        .unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].chunk_count, 3);
}

#[tokio::test]
async fn failed_status_records_the_error_message() {
    let pool = memory_pool().await;
    let doc = seed_document(&pool, "broken.pdf", None).await;

    documents::update_status(
        &pool,
        &doc,
        DocumentStatus::Failed,
        Some("text extraction produced no content"),
    )
    .await
    .unwrap();

    let fetched = documents::get_document(&pool, &doc).await.unwrap().unwrap();
    assert_eq!(fetched.status, models::DocumentStatus::Failed);
    assert_eq!(
        fetched.error_message.as_deref(),
        Some("text extraction produced no content")
    );
}

// ============ Conversation log ============

#[tokio::test]
async fn conversation_rows_round_trip() {
    let pool = memory_pool().await;

    conversations::append(
        &pool,
        "session-1",
        "微分の連鎖律を教えて",
        "連鎖律の解説です。",
        true,
        false,
        &["chunk-a".to_string(), "chunk-b".to_string()],
    )
    .await
    .unwrap();
    conversations::append(&pool, "session-2", "q", "a", false, false, &[])
        .await
        .unwrap();

    assert_eq!(conversations::count(&pool).await.unwrap(), 2);

    let rows = conversations::list_by_session(&pool, "session-1", 50, 0)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].question, "微分の連鎖律を教えて");
    assert!(rows[0].used_rag);
    assert_eq!(
        rows[0].referenced_chunk_ids,
        vec!["chunk-a".to_string(), "chunk-b".to_string()]
    );
}
