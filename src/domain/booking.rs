use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Actor, BookingId, BookingLogEntry, BookingSnapshot, BookingValidationError, CivilDate,
    DurationHours, InvalidTransition, LifecycleAction, LogEntryId, Resource, ResourceId,
    ResourceKind, StartTime, TimeWindow, TransitionError, TransitionNotPermitted, UserId,
};

/// 予約ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// 申請中（唯一の初期状態）
    Pending,
    /// 承認済み
    Confirmed,
    /// 返却済み（終端）
    Completed,
    /// 取消済み（終端）
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// 枠を占有しているか（重複判定・空き状況の対象か）
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(format!("Invalid booking status: {}", s)),
        }
    }
}

/// 予約作成時点のリソース表示情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLabel {
    pub name: String,
    pub category: String,
    pub location: Option<String>,
}

/// Booking集約 - 1つのリソースの1回の予約
///
/// 機材と会場は`resource_kind`で区別し、同じ実装を使う。
/// 会場固有の料金は`total_cost`としてオプションで持つ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,

    // 他の集約への参照
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
    pub resource_label: ResourceLabel,
    pub requester_id: UserId,

    // 予約枠
    pub date: CivilDate,
    pub start_time: StartTime,
    pub duration_hours: DurationHours,

    pub status: BookingStatus,
    pub total_cost: Option<Decimal>,
    pub idempotency_key: Option<String>,

    // 監査情報
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Booking {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_time, self.duration_hours)
    }

    /// 指定の枠と衝突するか
    ///
    /// 同じ日付（民間暦の等価比較）で、占有中のステータスで、時間帯が重なる場合のみ。
    pub fn conflicts_with(&self, date: CivilDate, window: &TimeWindow) -> bool {
        self.status.is_active() && self.date == date && self.window().overlaps(window)
    }

    /// 遷移時点のスナップショット
    pub fn snapshot(&self) -> BookingSnapshot {
        BookingSnapshot {
            date: self.date,
            start_time: self.start_time,
            duration_hours: self.duration_hours,
            resource_name: self.resource_label.name.clone(),
            resource_category: self.resource_label.category.clone(),
            location: self.resource_label.location.clone(),
            total_cost: self.total_cost,
        }
    }

    fn log_entry(
        &self,
        previous_status: Option<BookingStatus>,
        action: LifecycleAction,
        actor: &Actor,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> BookingLogEntry {
        BookingLogEntry {
            id: LogEntryId::new(),
            booking_id: self.id,
            resource_id: self.resource_id.clone(),
            resource_kind: self.resource_kind,
            requester_id: self.requester_id.clone(),
            previous_status,
            new_status: self.status,
            action,
            actor_id: actor.actor_id.clone(),
            note,
            details: self.snapshot(),
            occurred_at,
        }
    }
}

/// 予約作成の入力
#[derive(Debug, Clone)]
pub struct NewBooking<'a> {
    pub resource: &'a Resource,
    pub requester: &'a Actor,
    pub date: CivilDate,
    pub start_time: StartTime,
    pub duration_hours: DurationHours,
    pub idempotency_key: Option<String>,
}

/// 予約日が今日以降か検証する
///
/// `today`はサーバー側の基準で決めた日付。
pub fn validate_booking_date(
    date: CivilDate,
    today: CivilDate,
) -> Result<(), BookingValidationError> {
    if date < today {
        return Err(BookingValidationError::DateInPast { date, today });
    }
    Ok(())
}

/// 純粋関数：予約を作成する
///
/// ビジネスルール：
/// - 予約日は今日以降
/// - 状態はPending
/// - 会場は時間単価 × 時間数で料金を計算する
///
/// 副作用なし。新しいBookingと作成ログを返す。
/// リソースの稼働状態と枠の重複はアプリケーション層で確認する。
pub fn create_booking(
    request: NewBooking<'_>,
    today: CivilDate,
    created_at: DateTime<Utc>,
) -> Result<(Booking, BookingLogEntry), BookingValidationError> {
    validate_booking_date(request.date, today)?;

    let resource = request.resource;
    let booking = Booking {
        id: BookingId::new(),
        resource_id: resource.id.clone(),
        resource_kind: resource.kind,
        resource_label: ResourceLabel {
            name: resource.display_name.clone(),
            category: resource.category.clone(),
            location: resource.location.clone(),
        },
        requester_id: request.requester.actor_id.clone(),
        date: request.date,
        start_time: request.start_time,
        duration_hours: request.duration_hours,
        status: BookingStatus::Pending,
        total_cost: resource.booking_cost(request.duration_hours),
        idempotency_key: request.idempotency_key,
        created_at,
        status_changed_at: created_at,
    };

    let entry = booking.log_entry(
        None,
        LifecycleAction::Create,
        request.requester,
        None,
        created_at,
    );

    Ok((booking, entry))
}

/// 遷移を実行できる操作者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    Admin,
    RequesterOrAdmin,
}

/// 状態遷移表
///
/// | From      | To        | Action   | 操作者               |
/// |-----------|-----------|----------|----------------------|
/// | pending   | confirmed | confirm  | 管理者               |
/// | pending   | cancelled | cancel   | 申請者本人 or 管理者 |
/// | confirmed | cancelled | cancel   | 管理者               |
/// | confirmed | completed | complete | 管理者               |
fn transition_rule(
    from: BookingStatus,
    to: BookingStatus,
) -> Option<(LifecycleAction, Permission)> {
    use BookingStatus::*;
    match (from, to) {
        (Pending, Confirmed) => Some((LifecycleAction::Confirm, Permission::Admin)),
        (Pending, Cancelled) => Some((LifecycleAction::Cancel, Permission::RequesterOrAdmin)),
        (Confirmed, Cancelled) => Some((LifecycleAction::Cancel, Permission::Admin)),
        (Confirmed, Completed) => Some((LifecycleAction::Complete, Permission::Admin)),
        _ => None,
    }
}

/// 遷移表にある遷移か
pub fn is_allowed_transition(from: BookingStatus, to: BookingStatus) -> bool {
    transition_rule(from, to).is_some()
}

/// 純粋関数：状態遷移を計画する
///
/// 遷移表にない遷移は`InvalidTransition`、権限のない操作者は`NotPermitted`。
/// 副作用なし。遷移後のBookingとログエントリを返す。
/// 永続化は「現在のステータスが`booking.status`のときだけ更新」の条件付きで行うこと。
pub fn plan_transition(
    booking: &Booking,
    to: BookingStatus,
    actor: &Actor,
    note: Option<String>,
    at: DateTime<Utc>,
) -> Result<(Booking, BookingLogEntry), TransitionError> {
    let from = booking.status;
    let (action, permission) = transition_rule(from, to).ok_or(InvalidTransition { from, to })?;

    let permitted = match permission {
        Permission::Admin => actor.is_admin(),
        Permission::RequesterOrAdmin => actor.is_admin() || actor.actor_id == booking.requester_id,
    };
    if !permitted {
        return Err(TransitionNotPermitted { from, to }.into());
    }

    let updated = Booking {
        status: to,
        status_changed_at: at,
        ..booking.clone()
    };
    let entry = updated.log_entry(Some(from), action, actor, note, at);

    Ok((updated, entry))
}

/// 純粋関数：既存予約の中から衝突するものを探す
///
/// 複数ある場合は最も古く作成されたものを返す。
pub fn find_conflict(
    existing: &[Booking],
    resource_id: &ResourceId,
    date: CivilDate,
    window: &TimeWindow,
) -> Option<BookingId> {
    existing
        .iter()
        .filter(|b| &b.resource_id == resource_id && b.conflicts_with(date, window))
        .min_by_key(|b| b.created_at)
        .map(|b| b.id)
}

/// 純粋関数：指定月に占有されている日付の集合
///
/// 日付は保存された民間暦の日付からそのまま取り出す。
pub fn occupied_dates(bookings: &[Booking], year: i32, month: u32) -> BTreeSet<CivilDate> {
    bookings
        .iter()
        .filter(|b| b.status.is_active() && b.date.year() == year && b.date.month() == month)
        .map(|b| b.date)
        .collect()
}

/// 古い順（日付、開始時刻、作成日時）に並べる
pub fn sort_oldest_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        (a.date, a.start_time, a.created_at).cmp(&(b.date, b.start_time, b.created_at))
    });
}
