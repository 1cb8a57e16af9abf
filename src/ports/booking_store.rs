use crate::domain::{
    Booking, BookingId, BookingLogEntry, BookingStatus, CivilDate, DurationHours, ResourceId,
    StartTime, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::store_error::StoreResult;

/// 条件付きの状態変更
///
/// 現在のステータスが`expected`のときだけ`new`に更新する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub booking_id: BookingId,
    pub expected: BookingStatus,
    pub new: BookingStatus,
    pub changed_at: DateTime<Utc>,
}

/// 再送された予約リクエストを見つけるための条件
///
/// `idempotency_key`があれば申請者とキーの一致で判定する。
/// なければ同じ枠・同じ申請者の`pending`予約のうち`created_since`以降のものを探す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateProbe {
    pub resource_id: ResourceId,
    pub requester_id: UserId,
    pub date: CivilDate,
    pub start_time: StartTime,
    pub duration_hours: DurationHours,
    pub idempotency_key: Option<String>,
    pub created_since: DateTime<Utc>,
}

impl DuplicateProbe {
    /// 既存予約が同一リクエストの再送とみなせるか
    pub fn matches(&self, booking: &Booking) -> bool {
        if booking.requester_id != self.requester_id {
            return false;
        }
        match &self.idempotency_key {
            Some(key) => booking.idempotency_key.as_deref() == Some(key.as_str()),
            None => {
                booking.status == BookingStatus::Pending
                    && booking.resource_id == self.resource_id
                    && booking.date == self.date
                    && booking.start_time == self.start_time
                    && booking.duration_hours == self.duration_hours
                    && booking.created_at >= self.created_since
            }
        }
    }

    /// 既存予約が同じ枠（リソース・日付・開始時刻・時間）を指しているか
    ///
    /// 冪等キーで見つかった予約がこれを満たさなければ、キーの使い回し。
    pub fn same_slot_as(&self, booking: &Booking) -> bool {
        booking.resource_id == self.resource_id
            && booking.date == self.date
            && booking.start_time == self.start_time
            && booking.duration_hours == self.duration_hours
    }
}

/// 予約ストアポート
///
/// 予約は物理削除しない。取消・返却は終端ステータスで表す。
/// 状態の変更と監査ログの追記は常に同じ単位でコミットする。
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// 新しい予約と作成ログを保存する
    ///
    /// 同じリソース・同じ日付で時間帯が重なる占有中の予約があれば
    /// `StoreError::SlotTaken`を返し、何も保存しない。
    /// 同じ申請者・同じ冪等キーの予約があれば`StoreError::IdempotencyKeyTaken`。
    /// ログの書き込みに失敗した場合は`StoreError::AuditWrite`を返し、予約も保存しない。
    async fn insert(&self, booking: Booking, entry: BookingLogEntry) -> StoreResult<()>;

    /// 条件付きで状態を変更し、ログを追記する
    ///
    /// 現在のステータスが期待値と違えば`StoreError::StatusMismatch`。
    /// 成功時は更新後の予約を返す。
    async fn apply_transition(
        &self,
        change: StatusChange,
        entry: BookingLogEntry,
    ) -> StoreResult<Booking>;

    /// IDで予約を取得する
    async fn get(&self, booking_id: BookingId) -> StoreResult<Option<Booking>>;

    /// リソースの予約を日付範囲（両端含む）で取得する
    async fn find_by_resource(
        &self,
        resource_id: &ResourceId,
        from: CivilDate,
        to: CivilDate,
    ) -> StoreResult<Vec<Booking>>;

    /// リソースの占有中（pending / confirmed）の予約を取得する
    async fn find_active_by_resource(&self, resource_id: &ResourceId)
    -> StoreResult<Vec<Booking>>;

    /// 申請者の全予約を予約日の新しい順で取得する
    async fn find_by_requester(&self, requester_id: &UserId) -> StoreResult<Vec<Booking>>;

    /// 全予約を予約日の新しい順で取得する
    async fn list_all(&self) -> StoreResult<Vec<Booking>>;

    /// 再送されたリクエストに対応する既存予約を探す
    async fn find_duplicate(&self, probe: &DuplicateProbe) -> StoreResult<Option<Booking>>;
}
