use crate::domain::{AuditQuery, BookingLogEntry, LogEntryId};
use crate::ports::{AuditLog as AuditLogTrait, StoreError, StoreResult};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::{PgConnection, PgPool};

use super::rows::{LOG_COLUMNS, map_row_to_log_entry, store_error};

/// ログエントリを1件書き込む
///
/// 予約ストアの状態変更と同じトランザクションの中から呼ばれる。
pub(super) async fn append_in_tx(
    conn: &mut PgConnection,
    entry: &BookingLogEntry,
) -> StoreResult<()> {
    let details = serde_json::to_value(&entry.details)
        .map_err(|e| StoreError::AuditWrite(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO booking_logs (
            id,
            booking_id,
            resource_id,
            resource_kind,
            requester_id,
            previous_status,
            new_status,
            action,
            actor_id,
            note,
            details,
            occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id.value())
    .bind(entry.booking_id.value())
    .bind(entry.resource_id.as_str())
    .bind(entry.resource_kind.as_str())
    .bind(entry.requester_id.as_str())
    .bind(entry.previous_status.map(|s| s.as_str()))
    .bind(entry.new_status.as_str())
    .bind(entry.action.as_str())
    .bind(entry.actor_id.as_str())
    .bind(entry.note.as_deref())
    .bind(details)
    .bind(entry.occurred_at)
    .execute(conn)
    .await
    .map_err(|e| StoreError::AuditWrite(Box::new(e)))?;

    Ok(())
}

/// AuditLogのPostgreSQL実装
///
/// booking_logsテーブルへの追記と照会。
pub struct AuditLog {
    pool: PgPool,
}

impl AuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogTrait for AuditLog {
    async fn append(&self, entry: BookingLogEntry) -> StoreResult<LogEntryId> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        append_in_tx(&mut conn, &entry).await?;
        Ok(entry.id)
    }

    /// 条件はすべて任意。NULLのパラメータは絞り込みに使わない
    async fn query(&self, filter: &AuditQuery, limit: usize) -> StoreResult<Vec<BookingLogEntry>> {
        let sql = format!(
            r#"
            SELECT {LOG_COLUMNS}
            FROM booking_logs
            WHERE ($1::varchar IS NULL OR resource_kind = $1)
              AND ($2::uuid IS NULL OR booking_id = $2)
              AND ($3::varchar IS NULL OR resource_id = $3)
              AND ($4::varchar IS NULL OR action = $4)
              AND ($5::timestamptz IS NULL OR occurred_at >= $5)
            ORDER BY occurred_at DESC, sequence_number DESC
            LIMIT $6
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(filter.resource_kind.map(|k| k.as_str()))
            .bind(filter.booking_id.map(|id| id.value()))
            .bind(filter.resource_id.as_ref().map(|id| id.as_str()))
            .bind(filter.action.map(|a| a.as_str()))
            .bind(filter.since)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.iter().map(map_row_to_log_entry).collect()
    }

    /// Stream all log entries in insertion order
    fn stream_all(&self) -> BoxStream<'_, StoreResult<BookingLogEntry>> {
        let stream = sqlx::query(
            r#"
            SELECT id, booking_id, resource_id, resource_kind, requester_id,
                   previous_status, new_status, action, actor_id, note, details, occurred_at
            FROM booking_logs
            ORDER BY sequence_number ASC
            "#,
        )
        .fetch(&self.pool)
        .map(|row_result| {
            let row = row_result.map_err(store_error)?;
            map_row_to_log_entry(&row)
        });

        Box::pin(stream)
    }
}
