use thiserror::Error;

use crate::domain::{
    BookingId, BookingValidationError, InvalidTransition, OperationalStatus, ResourceId,
    ScanDecodeError, TransitionError, TransitionNotPermitted,
};
use crate::ports::{BoxError, StoreError};

/// 予約管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum ReservationError {
    /// 入力が不正（呼び出し側で修正する）
    #[error(transparent)]
    Validation(#[from] BookingValidationError),

    /// 枠が既存の予約と重なっている
    #[error("Slot overlaps booking {existing}")]
    SlotConflict { existing: BookingId },

    /// リソースが予約を受け付けない状態
    #[error("Resource {resource_id} is {status} and cannot be booked")]
    ResourceUnavailable {
        resource_id: ResourceId,
        status: OperationalStatus,
    },

    /// 状態遷移表にない遷移（競合で負けた場合も含む）
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// 操作者に権限がない
    #[error(transparent)]
    NotPermitted(#[from] TransitionNotPermitted),

    /// QRペイロードを解釈できない
    #[error(transparent)]
    ScanDecode(#[from] ScanDecodeError),

    #[error("Resource {0} not found")]
    ResourceNotFound(ResourceId),

    #[error("Booking {0} not found")]
    BookingNotFound(BookingId),

    /// ストア・カタログに接続できない（リトライ可）
    #[error("Store unavailable")]
    StoreUnavailable(#[source] BoxError),

    /// 時間内に応答がない（リトライ可）
    #[error("Timed out while trying to {operation}")]
    Timeout { operation: &'static str },

    /// 監査ログを書けなかった（状態変更は適用されていない）
    #[error("Audit log write failed")]
    AuditWriteFailure(#[source] BoxError),

    /// 保存データの破損
    #[error("Stored data is corrupted: {0}")]
    Corrupted(String),
}

impl ReservationError {
    /// 同じリクエストを再送してよいか
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReservationError::StoreUnavailable(_) | ReservationError::Timeout { .. }
        )
    }
}

impl From<TransitionError> for ReservationError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::Invalid(e) => ReservationError::InvalidTransition(e),
            TransitionError::NotPermitted(e) => ReservationError::NotPermitted(e),
        }
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(e) => ReservationError::StoreUnavailable(e),
            StoreError::AuditWrite(e) => ReservationError::AuditWriteFailure(e),
            StoreError::BookingNotFound(id) => ReservationError::BookingNotFound(id),
            StoreError::SlotTaken(existing) => ReservationError::SlotConflict { existing },
            StoreError::IdempotencyKeyTaken(key) => {
                ReservationError::Validation(BookingValidationError::IdempotencyKeyReused(key))
            }
            // 呼び出し側で遷移先と組み合わせて InvalidTransition にする。ここに来るのは想定外
            StoreError::StatusMismatch { expected, actual } => ReservationError::Corrupted(
                format!("unexpected status mismatch (expected {expected}, found {actual})"),
            ),
            StoreError::Corrupted(msg) => ReservationError::Corrupted(msg),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, ReservationError>;
