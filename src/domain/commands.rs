use chrono::{DateTime, Utc};

use super::{Actor, BookingId, BookingStatus, CivilDate, DurationHours, ResourceId, StartTime};

/// コマンド：リソースを予約する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBooking {
    pub resource_id: ResourceId,
    pub requester: Actor,
    pub date: CivilDate,
    pub start_time: StartTime,
    pub duration_hours: DurationHours,
    /// クライアントが指定する冪等キー（任意）
    pub idempotency_key: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// コマンド：予約の状態を遷移させる
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionBooking {
    pub booking_id: BookingId,
    pub target: BookingStatus,
    pub actor: Actor,
    pub note: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// コマンド：返却を確定する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmReturn {
    pub booking_id: BookingId,
    pub actor: Actor,
    pub note: Option<String>,
    pub returned_at: DateTime<Utc>,
}
