use thiserror::Error;

use super::{BookingStatus, CivilDate};

/// 予約リクエストの入力エラー
///
/// 呼び出し側が入力を修正すべきもの。自動リトライはしない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingValidationError {
    /// 予約時間が1〜24時間の範囲外
    #[error("Duration must be between 1 and 24 hours (got {0})")]
    DurationOutOfRange(i64),

    /// 予約日が過去
    #[error("Booking date {date} is before today ({today})")]
    DateInPast { date: CivilDate, today: CivilDate },

    /// 開始時刻の形式が不正
    #[error("Start time must be HH:MM (got {0:?})")]
    MalformedStartTime(String),

    /// リソースIDの形式が不正
    #[error("Resource id must be 24 hexadecimal characters (got {0:?})")]
    MalformedResourceId(String),

    /// 年月の指定が不正
    #[error("Invalid calendar month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    /// 冪等キーが別内容のリクエストで使い回された
    #[error("Idempotency key {0:?} was already used for a different booking request")]
    IdempotencyKeyReused(String),
}

/// 状態遷移表にない遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

/// 遷移表にはあるが、操作者に権限がない
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Actor is not permitted to move a booking from {from} to {to}")]
pub struct TransitionNotPermitted {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

/// 状態遷移のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Invalid(#[from] InvalidTransition),

    #[error(transparent)]
    NotPermitted(#[from] TransitionNotPermitted),
}

/// QRペイロードからリソースIDを取り出せなかった
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Scanned payload does not contain a resource id")]
pub struct ScanDecodeError;
