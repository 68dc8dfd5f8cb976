//! Vector similarity search over stored chunks.
//!
//! Chunks are stored with their passage embeddings as little-endian f32
//! BLOBs; search loads the candidate rows, computes cosine similarity in
//! Rust, and returns the top K ranked descending. Only chunks whose owning
//! document has status `completed` are eligible — a chunk persisted under a
//! `processing` or `failed` document never surfaces, even if it already has
//! an embedding.
//!
//! The linear scan is fine for a course-corpus-sized index; swapping in an
//! ANN structure behind [`Retriever`] would not change the contract.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::SearchFailed;
use crate::models::{Chunk, RetrievedChunk};

/// Retrieval seam used by the answer orchestrator. The production
/// implementation is [`SqliteIndex`]; tests substitute counting doubles.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `top_k` eligible chunks ranked by descending cosine
    /// similarity to `query_vector`. Fewer than `top_k` eligible chunks is
    /// not an error. `subject_filter` is an exact match on the owning
    /// document's subject tag.
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        subject_filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchFailed>;
}

/// Optional predicates composed onto the eligibility query.
///
/// Each clause is pushed as a parameterized condition; there is no SQL
/// string concatenation of user input anywhere.
#[derive(Debug, Default, Clone)]
pub struct SearchFilters {
    pub subject: Option<String>,
}

impl SearchFilters {
    pub fn with_subject(subject: Option<&str>) -> Self {
        Self {
            subject: subject.map(|s| s.to_string()),
        }
    }

    /// Append this filter's clauses to a query that already has a WHERE.
    pub fn push_clauses(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(ref subject) = self.subject {
            qb.push(" AND d.subject = ");
            qb.push_bind(subject.clone());
        }
    }
}

/// Chunk store and similarity index backed by the SQLite pool.
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a document's chunks with their embeddings in one
    /// transaction. Either every chunk lands or none do, so a document can
    /// never end up partially searchable.
    pub async fn create_batch(&self, chunks: &[Chunk]) -> Result<(), SearchFailed> {
        let mut tx = self.pool.begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, content, embedding, metadata_json, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(vec_to_blob(&chunk.embedding))
            .bind(&chunk.metadata_json)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn count_by_document(&self, document_id: &str) -> Result<i64, SearchFailed> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl Retriever for SqliteIndex {
    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        subject_filter: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchFailed> {
        let filters = SearchFilters::with_subject(subject_filter);
        let mut qb = eligibility_query(&filters);

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut candidates: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                RetrievedChunk {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    filename: row.get("filename"),
                    subject: row.get("subject"),
                    content: row.get("content"),
                    similarity: cosine_similarity(query_vector, &vec),
                }
            })
            .collect();

        // Stable sort: ties keep insertion (rowid) order.
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);

        Ok(candidates)
    }
}

/// Base eligibility query plus the optional filter clauses.
fn eligibility_query(filters: &SearchFilters) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new(
        "SELECT c.id, c.document_id, c.content, c.embedding, d.filename, d.subject \
         FROM chunks c \
         INNER JOIN documents d ON c.document_id = d.id \
         WHERE d.status = ",
    );
    qb.push_bind("completed");
    filters.push_clauses(&mut qb);
    qb.push(" ORDER BY c.rowid");
    qb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_query_restricts_to_completed() {
        let qb = eligibility_query(&SearchFilters::default());
        let sql = qb.sql();
        assert!(sql.contains("WHERE d.status = ?"));
        assert!(!sql.contains("subject ="));
    }

    #[test]
    fn test_subject_clause_is_parameterized() {
        let qb = eligibility_query(&SearchFilters::with_subject(Some("数学")));
        let sql = qb.sql();
        assert!(sql.contains("AND d.subject = ?"));
        // The literal value never appears in the SQL text.
        assert!(!sql.contains("数学"));
    }

    #[test]
    fn test_filters_without_subject_add_nothing() {
        let mut qb = QueryBuilder::new("SELECT 1 WHERE 1=1");
        SearchFilters::with_subject(None).push_clauses(&mut qb);
        assert_eq!(qb.sql(), "SELECT 1 WHERE 1=1");
    }
}
