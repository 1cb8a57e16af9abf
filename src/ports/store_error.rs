use thiserror::Error;

use crate::domain::{BookingId, BookingStatus};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 予約ストア・監査ログ共通のエラー
///
/// アプリケーション層が一時障害と致命的障害を区別できるように型で分ける。
#[derive(Debug, Error)]
pub enum StoreError {
    /// ストアに接続できない（一時障害、リトライ可）
    #[error("Store unavailable")]
    Unavailable(#[source] BoxError),

    /// 監査ログの書き込みに失敗した（状態変更もロールバック済み）
    #[error("Audit log write failed")]
    AuditWrite(#[source] BoxError),

    #[error("Booking {0} not found")]
    BookingNotFound(BookingId),

    /// 条件付き更新で現在のステータスが期待値と違った
    #[error("Booking status is {actual}, expected {expected}")]
    StatusMismatch {
        expected: BookingStatus,
        actual: BookingStatus,
    },

    /// 条件付き挿入で重複する予約が見つかった
    #[error("Slot already held by booking {0}")]
    SlotTaken(BookingId),

    /// 同じ申請者の同じ冪等キーを持つ予約が既にある
    #[error("Idempotency key {0:?} already used by this requester")]
    IdempotencyKeyTaken(String),

    /// 保存データが壊れている
    #[error("Stored data is corrupted: {0}")]
    Corrupted(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
