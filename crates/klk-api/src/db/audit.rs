//! Audit log persistence as a hash chain.
//!
//! Every admin mutation appends an entry whose hash covers the previous
//! entry's hash and the entry's own fields. Editing or deleting a row breaks
//! the chain at that point, which [`verify_chain_integrity`] reports.

use chrono::{DateTime, Utc};
use klk_core::AuditAction;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use utoipa::ToSchema;

use crate::extractors::{ClientMeta, Pagination};

/// Hash recorded as `previous_hash` by the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// An entry to append.
pub struct AuditEvent<'a> {
    pub user_id: Option<i64>,
    pub action: AuditAction,
    pub model_name: &'a str,
    pub object_id: i64,
    pub description: String,
    pub client: &'a ClientMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: String,
    pub model_name: String,
    pub object_id: i64,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub previous_hash: String,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

fn entry_hash(
    previous: &str,
    user_id: Option<i64>,
    action: &str,
    model_name: &str,
    object_id: i64,
    description: &str,
    created_at: &DateTime<Utc>,
) -> String {
    let user = user_id.map(|id| id.to_string()).unwrap_or_default();
    sha256_hex(&format!(
        "{previous}|{user}|{action}|{model_name}|{object_id}|{description}|{}",
        created_at.to_rfc3339()
    ))
}

/// Append an entry, chaining to the latest one. Returns the new id.
pub async fn append(
    conn: &mut SqliteConnection,
    event: AuditEvent<'_>,
    now: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let previous: Option<String> =
        sqlx::query_scalar("SELECT entry_hash FROM audit_logs ORDER BY id DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
    let previous = previous.as_deref().unwrap_or(GENESIS_HASH);
    let hash = entry_hash(
        previous,
        event.user_id,
        event.action.as_str(),
        event.model_name,
        event.object_id,
        &event.description,
        &now,
    );

    let result = sqlx::query(
        "INSERT INTO audit_logs (user_id, action, model_name, object_id, description,
             ip_address, user_agent, previous_hash, entry_hash, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.user_id)
    .bind(event.action.as_str())
    .bind(event.model_name)
    .bind(event.object_id)
    .bind(&event.description)
    .bind(&event.client.ip_address)
    .bind(&event.client.user_agent)
    .bind(previous)
    .bind(&hash)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        action = event.action.as_str(),
        model = event.model_name,
        object_id = event.object_id,
        "audit entry appended"
    );
    Ok(result.last_insert_rowid())
}

const ENTRY_SELECT: &str = "SELECT a.id, a.user_id, u.username, a.action, a.model_name,
        a.object_id, a.description, a.ip_address, a.user_agent, a.previous_hash,
        a.entry_hash, a.created_at
     FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id";

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub model_name: Option<String>,
}

impl AuditFilter {
    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(action) = self.action {
            qb.push(" AND a.action = ").push_bind(action.as_str());
        }
        if let Some(model) = &self.model_name {
            qb.push(" AND a.model_name = ").push_bind(model.clone());
        }
    }
}

/// Newest first.
pub async fn list(
    conn: &mut SqliteConnection,
    filter: &AuditFilter,
    page: &Pagination,
) -> Result<(Vec<AuditEntry>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_logs a");
    filter.push_where(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(ENTRY_SELECT);
    filter.push_where(&mut qb);
    qb.push(" ORDER BY a.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = qb
        .build_query_as::<AuditEntry>()
        .fetch_all(&mut *conn)
        .await?;
    Ok((rows, total))
}

pub async fn recent(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditEntry>(&format!("{ENTRY_SELECT} ORDER BY a.id DESC LIMIT ?"))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChainIntegrityResult {
    pub total_entries: usize,
    /// Entries whose `previous_hash` does not match the entry before them.
    pub broken_links: usize,
    /// Entries whose stored hash does not match their contents.
    pub tampered_entries: usize,
    pub first_bad_id: Option<i64>,
    pub chain_valid: bool,
}

/// Walk the chain oldest first, checking links and recomputing hashes.
pub async fn verify_chain_integrity(
    conn: &mut SqliteConnection,
) -> Result<ChainIntegrityResult, sqlx::Error> {
    let entries = sqlx::query_as::<_, AuditEntry>(&format!("{ENTRY_SELECT} ORDER BY a.id ASC"))
        .fetch_all(&mut *conn)
        .await?;

    let mut broken_links = 0;
    let mut tampered_entries = 0;
    let mut first_bad_id = None;
    let mut expected_previous = GENESIS_HASH.to_string();

    for entry in &entries {
        let mut bad = false;
        if entry.previous_hash != expected_previous {
            broken_links += 1;
            bad = true;
        }
        let recomputed = entry_hash(
            &entry.previous_hash,
            entry.user_id,
            &entry.action,
            &entry.model_name,
            entry.object_id,
            &entry.description,
            &entry.created_at,
        );
        if recomputed != entry.entry_hash {
            tampered_entries += 1;
            bad = true;
        }
        if bad && first_bad_id.is_none() {
            first_bad_id = Some(entry.id);
        }
        expected_previous = entry.entry_hash.clone();
    }

    Ok(ChainIntegrityResult {
        total_entries: entries.len(),
        broken_links,
        tampered_entries,
        first_bad_id,
        chain_valid: broken_links == 0 && tampered_entries == 0,
    })
}

fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{b:02x}")).collect()
}
