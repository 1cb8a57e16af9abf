use futures::stream::{self, BoxStream, StreamExt};

use crate::domain::{AuditQuery, BookingLogEntry, LogEntryId};
use crate::ports::StoreError;

use super::dependencies::{ServiceDependencies, bounded};
use super::errors::{ReservationError, Result};

/// 監査ログ照会の既定件数
pub const DEFAULT_AUDIT_LIMIT: usize = 100;
/// 監査ログ照会の最大件数
pub const MAX_AUDIT_LIMIT: usize = 500;

/// 監査ログを新しい順で照会する
///
/// `limit`は1〜500に丸める。未指定なら100件。
pub async fn query_audit_log(
    deps: &ServiceDependencies,
    filter: AuditQuery,
    limit: Option<usize>,
) -> Result<Vec<BookingLogEntry>> {
    let limit = clamp_limit(limit);
    Ok(bounded(
        deps.settings.store_timeout,
        "query audit log",
        deps.audit_log.query(&filter, limit),
    )
    .await??)
}

/// ログエントリを単独で追記する
///
/// 状態変更を伴う追記はストアが同じ単位で行う。これは既に確定した変更の補記用。
/// 書き込めない場合はどの原因でも`AuditWriteFailure`（黙って失敗しない）。
pub async fn append_log_entry(
    deps: &ServiceDependencies,
    entry: BookingLogEntry,
) -> Result<LogEntryId> {
    let booking_id = entry.booking_id;
    match bounded(
        deps.settings.store_timeout,
        "append audit entry",
        deps.audit_log.append(entry),
    )
    .await?
    {
        Ok(id) => Ok(id),
        Err(StoreError::AuditWrite(source)) | Err(StoreError::Unavailable(source)) => {
            tracing::error!(%booking_id, error = %source, "Audit write failed");
            Err(ReservationError::AuditWriteFailure(source))
        }
        Err(other) => {
            tracing::error!(%booking_id, error = %other, "Audit write failed");
            Err(ReservationError::AuditWriteFailure(Box::new(other)))
        }
    }
}

/// 全エントリを古い順に流す
///
/// 件数制限はない。呼び出し側が順に書き出す。
/// 次のエントリが`store_timeout`以内に届かなければ`Timeout`を流して終わる。
pub fn export_audit_log(deps: &ServiceDependencies) -> BoxStream<'_, Result<BookingLogEntry>> {
    let limit = deps.settings.store_timeout;
    stream::unfold(Some(deps.audit_log.stream_all()), move |entries| async move {
        let mut entries = entries?;
        match bounded(limit, "export audit log", entries.next()).await {
            Ok(Some(entry)) => Some((entry.map_err(ReservationError::from), Some(entries))),
            Ok(None) => None,
            Err(timeout) => Some((Err(timeout), None)),
        }
    })
    .boxed()
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT)
}
