//! Supporting documents uploaded by beneficiaries.

use chrono::{DateTime, Utc};
use klk_core::{DocumentStatus, DocumentType};
use serde::Serialize;
use sqlx::SqliteConnection;
use utoipa::ToSchema;

use super::profiles::Scope;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Document {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub document_type: DocumentType,
    #[serde(skip)]
    pub file_path: String,
    pub original_name: String,
    pub file_size: i64,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub status: DocumentStatus,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

pub struct NewDocument<'a> {
    pub user_id: i64,
    pub name: &'a str,
    pub document_type: DocumentType,
    pub file_path: &'a str,
    pub original_name: &'a str,
    pub file_size: i64,
}

pub async fn insert(
    conn: &mut SqliteConnection,
    new: &NewDocument<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO documents (user_id, name, document_type, file_path, original_name,
             file_size, status, uploaded_at)
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(new.user_id)
    .bind(new.name)
    .bind(new.document_type.as_str())
    .bind(new.file_path)
    .bind(new.original_name)
    .bind(new.file_size)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// A user's documents, newest first, optionally filtered.
pub async fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    status: Option<DocumentStatus>,
    document_type: Option<DocumentType>,
) -> Result<Vec<Document>, sqlx::Error> {
    sqlx::query_as::<_, Document>(
        "SELECT * FROM documents
         WHERE user_id = ? AND (? IS NULL OR status = ?) AND (? IS NULL OR document_type = ?)
         ORDER BY uploaded_at DESC, id DESC",
    )
    .bind(user_id)
    .bind(status.map(|s| s.as_str()))
    .bind(status.map(|s| s.as_str()))
    .bind(document_type.map(|t| t.as_str()))
    .bind(document_type.map(|t| t.as_str()))
    .fetch_all(&mut *conn)
    .await
}

/// A pending document with its owner's name, for the review queue.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct PendingDocument {
    pub id: i64,
    pub user_id: i64,
    pub student_name: String,
    pub name: String,
    pub document_type: String,
    pub original_name: String,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
}

pub async fn pending(conn: &mut SqliteConnection) -> Result<Vec<PendingDocument>, sqlx::Error> {
    sqlx::query_as::<_, PendingDocument>(
        "SELECT d.id, d.user_id, TRIM(u.first_name || ' ' || u.last_name) AS student_name,
                d.name, d.document_type, d.original_name, d.file_size, d.uploaded_at
         FROM documents d JOIN users u ON u.id = d.user_id
         WHERE d.status = 'pending' ORDER BY d.uploaded_at, d.id",
    )
    .fetch_all(&mut *conn)
    .await
}

pub async fn set_review(
    conn: &mut SqliteConnection,
    id: i64,
    status: DocumentStatus,
    reviewer_id: i64,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE documents SET status = ?, reviewed_by = ?, reviewed_at = ?, review_notes = ?
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(reviewer_id)
    .bind(now)
    .bind(notes)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Document statuses of every beneficiary in `scope`.
pub async fn statuses(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Vec<DocumentStatus>, sqlx::Error> {
    let rows: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT d.status FROM documents d JOIN profiles p ON p.user_id = d.user_id WHERE {}",
        scope.condition()
    ))
    .bind(scope.bind_value())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().filter_map(|s| s.parse().ok()).collect())
}

/// `(status, count)` pairs, optionally for one user.
pub async fn counts_by_status(
    conn: &mut SqliteConnection,
    user_id: Option<i64>,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM documents WHERE (? IS NULL OR user_id = ?)
         GROUP BY status ORDER BY status",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::db::testing::seed_beneficiary;

    #[tokio::test]
    async fn review_and_scope_statuses() {
        let pool = init_memory_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let user = seed_beneficiary(&mut conn, "d@example.com").await;
        let new = NewDocument {
            user_id: user,
            name: "Report card",
            document_type: DocumentType::ReportCard,
            file_path: "documents/1/x.pdf",
            original_name: "card.pdf",
            file_size: 10,
        };
        let id = insert(&mut conn, &new, Utc::now()).await.unwrap();
        insert(&mut conn, &new, Utc::now()).await.unwrap();
        assert_eq!(pending(&mut conn).await.unwrap().len(), 2);

        set_review(&mut conn, id, DocumentStatus::Approved, user, Some("fine"), Utc::now())
            .await
            .unwrap();
        let approved = list_for_user(&mut conn, user, Some(DocumentStatus::Approved), None)
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].review_notes.as_deref(), Some("fine"));

        let mut all = statuses(&mut conn, Scope::All).await.unwrap();
        all.sort_by_key(|s| s.as_str());
        assert_eq!(all, vec![DocumentStatus::Approved, DocumentStatus::Pending]);
        assert_eq!(
            counts_by_status(&mut conn, Some(user)).await.unwrap(),
            vec![("approved".to_string(), 1), ("pending".to_string(), 1)]
        );
    }
}
