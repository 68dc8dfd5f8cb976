//! Document metadata storage.
//!
//! Documents are created with status `processing` when ingestion begins and
//! moved to `completed` or `failed` by the pipeline. Deletion cascades to
//! the document's chunks (foreign key, single statement).

use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::error::SearchFailed;
use crate::models::{Document, DocumentStatus};

/// Optional predicates for listing and counting documents.
#[derive(Debug, Default, Clone)]
pub struct DocumentFilters {
    pub status: Option<DocumentStatus>,
    pub subject: Option<String>,
}

impl DocumentFilters {
    pub fn push_clauses(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(status) = self.status {
            qb.push(" AND d.status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(ref subject) = self.subject {
            qb.push(" AND d.subject = ");
            qb.push_bind(subject.clone());
        }
    }
}

/// A document row joined with its chunk count, for listings.
#[derive(Debug, Clone)]
pub struct DocumentListing {
    pub document: Document,
    pub chunk_count: i64,
}

pub async fn create_document(
    pool: &SqlitePool,
    filename: &str,
    subject: Option<&str>,
    file_size_bytes: i64,
    mime_type: &str,
) -> Result<String, SearchFailed> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO documents (id, filename, subject, status, file_size_bytes, mime_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(filename)
    .bind(subject)
    .bind(DocumentStatus::Processing.as_str())
    .bind(file_size_bytes)
    .bind(mime_type)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn get_document(
    pool: &SqlitePool,
    document_id: &str,
) -> Result<Option<Document>, SearchFailed> {
    let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| document_from_row(&row)))
}

pub async fn list_documents(
    pool: &SqlitePool,
    filters: &DocumentFilters,
    limit: i64,
    offset: i64,
) -> Result<Vec<DocumentListing>, SearchFailed> {
    let mut qb = QueryBuilder::new(
        "SELECT d.*, COUNT(c.id) AS chunk_count \
         FROM documents d \
         LEFT JOIN chunks c ON d.id = c.document_id \
         WHERE 1=1",
    );
    filters.push_clauses(&mut qb);
    qb.push(" GROUP BY d.id ORDER BY d.created_at DESC LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| DocumentListing {
            document: document_from_row(row),
            chunk_count: row.get("chunk_count"),
        })
        .collect())
}

pub async fn count_documents(
    pool: &SqlitePool,
    filters: &DocumentFilters,
) -> Result<i64, SearchFailed> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) AS count FROM documents d WHERE 1=1");
    filters.push_clauses(&mut qb);

    let row = qb.build().fetch_one(pool).await?;
    Ok(row.get("count"))
}

/// Record the outcome of ingestion. `error_message` is cleared on success
/// and recorded on failure.
pub async fn update_status(
    pool: &SqlitePool,
    document_id: &str,
    status: DocumentStatus,
    error_message: Option<&str>,
) -> Result<bool, SearchFailed> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE documents SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(error_message)
    .bind(now)
    .bind(document_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn update_subject(
    pool: &SqlitePool,
    document_id: &str,
    subject: &str,
) -> Result<bool, SearchFailed> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("UPDATE documents SET subject = ?, updated_at = ? WHERE id = ?")
        .bind(subject)
        .bind(now)
        .bind(document_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Delete a document; its chunks go with it via the cascading foreign key.
pub async fn delete_document(pool: &SqlitePool, document_id: &str) -> Result<bool, SearchFailed> {
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Document {
    let status_str: String = row.get("status");
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        subject: row.get("subject"),
        status: DocumentStatus::parse(&status_str).unwrap_or(DocumentStatus::Failed),
        error_message: row.get("error_message"),
        file_size_bytes: row.get("file_size_bytes"),
        mime_type: row.get("mime_type"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
