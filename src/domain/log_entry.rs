use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    BookingId, BookingStatus, CivilDate, DurationHours, LogEntryId, ResourceId, ResourceKind,
    StartTime, UserId,
};

/// 状態遷移を引き起こした操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Create,
    Confirm,
    Cancel,
    Complete,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Create => "create",
            LifecycleAction::Confirm => "confirm",
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::Complete => "complete",
        }
    }
}

impl std::str::FromStr for LifecycleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(LifecycleAction::Create),
            "confirm" => Ok(LifecycleAction::Confirm),
            "cancel" => Ok(LifecycleAction::Cancel),
            "complete" => Ok(LifecycleAction::Complete),
            _ => Err(format!("Invalid lifecycle action: {}", s)),
        }
    }
}

/// 遷移時点の予約内容のスナップショット
///
/// カタログ側の名称が後から変わっても履歴が読めるように保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSnapshot {
    pub date: CivilDate,
    pub start_time: StartTime,
    pub duration_hours: DurationHours,
    pub resource_name: String,
    pub resource_category: String,
    pub location: Option<String>,
    pub total_cost: Option<Decimal>,
}

/// 監査ログエントリ
///
/// 成功した状態遷移1回につき1件だけ作られる。追記専用で、変更・削除しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingLogEntry {
    pub id: LogEntryId,
    pub booking_id: BookingId,
    pub resource_id: ResourceId,
    pub resource_kind: ResourceKind,
    pub requester_id: UserId,
    /// 作成時はNone
    pub previous_status: Option<BookingStatus>,
    pub new_status: BookingStatus,
    pub action: LifecycleAction,
    pub actor_id: UserId,
    pub note: Option<String>,
    pub details: BookingSnapshot,
    pub occurred_at: DateTime<Utc>,
}

/// 監査ログの検索条件
///
/// すべて省略可能。指定された条件はAND結合される。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub resource_kind: Option<ResourceKind>,
    pub booking_id: Option<BookingId>,
    pub resource_id: Option<ResourceId>,
    pub action: Option<LifecycleAction>,
    pub since: Option<DateTime<Utc>>,
}

impl AuditQuery {
    /// エントリが条件に一致するか
    pub fn matches(&self, entry: &BookingLogEntry) -> bool {
        self.resource_kind.is_none_or(|k| entry.resource_kind == k)
            && self.booking_id.is_none_or(|b| entry.booking_id == b)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|r| &entry.resource_id == r)
            && self.action.is_none_or(|a| entry.action == a)
            && self.since.is_none_or(|s| entry.occurred_at >= s)
    }
}
