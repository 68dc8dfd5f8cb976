//! Conversation audit log.
//!
//! One row per answered question, written by the caller after the answer
//! pipeline succeeds — never by the orchestrator itself. Rows are never
//! mutated.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::SearchFailed;
use crate::models::Conversation;

#[allow(clippy::too_many_arguments)]
pub async fn append(
    pool: &SqlitePool,
    session_id: &str,
    question: &str,
    answer: &str,
    used_rag: bool,
    used_web_search: bool,
    referenced_chunk_ids: &[String],
) -> Result<String, SearchFailed> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let ids_json = serde_json::to_string(referenced_chunk_ids).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        r#"
        INSERT INTO conversations (id, session_id, question, answer, used_rag, used_web_search, referenced_chunk_ids, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(session_id)
    .bind(question)
    .bind(answer)
    .bind(used_rag)
    .bind(used_web_search)
    .bind(&ids_json)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn list_by_session(
    pool: &SqlitePool,
    session_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Conversation>, SearchFailed> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM conversations
        WHERE session_id = ?
        ORDER BY created_at DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(session_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let ids_json: String = row.get("referenced_chunk_ids");
            Conversation {
                id: row.get("id"),
                session_id: row.get("session_id"),
                question: row.get("question"),
                answer: row.get("answer"),
                used_rag: row.get("used_rag"),
                used_web_search: row.get("used_web_search"),
                referenced_chunk_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
                created_at: row.get("created_at"),
            }
        })
        .collect())
}

pub async fn count(pool: &SqlitePool) -> Result<i64, SearchFailed> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
