use crate::domain::{AuditQuery, BookingLogEntry, LogEntryId};
use async_trait::async_trait;
use futures::stream::BoxStream;

use super::store_error::StoreResult;

/// 監査ログポート
///
/// 予約の状態遷移履歴の唯一の読み書き経路。
/// エントリは追記専用で、変更・削除しない。
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// エントリを追記する
    ///
    /// ストアが使えない場合は必ずエラーを返す（黙って失敗しない）。
    async fn append(&self, entry: BookingLogEntry) -> StoreResult<LogEntryId>;

    /// 条件に一致するエントリを新しい順で最大`limit`件返す
    async fn query(&self, filter: &AuditQuery, limit: usize) -> StoreResult<Vec<BookingLogEntry>>;

    /// 全エントリを古い順に流す（エクスポート用）
    fn stream_all(&self) -> BoxStream<'_, StoreResult<BookingLogEntry>>;
}
