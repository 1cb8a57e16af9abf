use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::reservation::ReturnCandidates;
use crate::domain::{
    Actor, AuditQuery, Booking, BookingId, BookingValidationError, DurationHours,
    LifecycleAction, Resource, ResourceId, ResourceKind, StartTime, commands::RequestBooking,
};

/// 予約作成リクエスト（POST /bookings）
///
/// `date`は民間暦の日付（YYYY-MM-DD）。タイムスタンプは受け付けない。
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub resource_id: String,
    pub date: NaiveDate,
    /// HH:MM
    pub start_time: String,
    pub duration_hours: i64,
}

impl CreateBookingRequest {
    /// リクエストをコマンドに変換する
    pub fn to_command(
        &self,
        requester: Actor,
        idempotency_key: Option<String>,
        requested_at: DateTime<Utc>,
    ) -> Result<RequestBooking, BookingValidationError> {
        Ok(RequestBooking {
            resource_id: ResourceId::parse(&self.resource_id)?,
            requester,
            date: self.date,
            start_time: StartTime::parse(&self.start_time)?,
            duration_hours: DurationHours::try_from(self.duration_hours)?,
            idempotency_key,
            requested_at,
        })
    }
}

/// 状態遷移リクエストのボディ（任意）
#[derive(Debug, Default, Deserialize)]
pub struct TransitionRequest {
    pub note: Option<String>,
}

/// スキャンリクエスト（POST /scans/resolve, POST /scans/return）
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub payload: String,
}

/// 空き状況のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub year: i32,
    pub month: u32,
}

/// リソース一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    pub kind: Option<String>,
    pub category: Option<String>,
}

/// 監査ログ照会のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub resource_kind: Option<String>,
    pub booking_id: Option<Uuid>,
    pub resource_id: Option<String>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditLogQuery {
    /// クエリパラメータを検索条件に変換する
    pub fn to_filter(&self) -> Result<AuditQuery, String> {
        Ok(AuditQuery {
            resource_kind: self
                .resource_kind
                .as_deref()
                .map(str::parse::<ResourceKind>)
                .transpose()?,
            booking_id: self.booking_id.map(BookingId::from_uuid),
            resource_id: self
                .resource_id
                .as_deref()
                .map(ResourceId::parse)
                .transpose()
                .map_err(|e| e.to_string())?,
            action: self
                .action
                .as_deref()
                .map(str::parse::<LifecycleAction>)
                .transpose()?,
            since: self.since,
        })
    }
}

/// 予約レスポンス
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub resource_id: String,
    pub resource_kind: String,
    pub resource_name: String,
    pub resource_category: String,
    pub location: Option<String>,
    pub requester_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub duration_hours: u8,
    pub status: String,
    pub total_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        let end = booking.window().end();
        Self {
            booking_id: booking.id.value(),
            resource_id: booking.resource_id.to_string(),
            resource_kind: booking.resource_kind.as_str().to_string(),
            resource_name: booking.resource_label.name,
            resource_category: booking.resource_label.category,
            location: booking.resource_label.location,
            requester_id: booking.requester_id.to_string(),
            date: booking.date,
            start_time: booking.start_time.to_string(),
            end_time: format!("{:02}:{:02}", end / 60, end % 60),
            duration_hours: booking.duration_hours.value(),
            status: booking.status.as_str().to_string(),
            total_cost: booking.total_cost,
            created_at: booking.created_at,
            status_changed_at: booking.status_changed_at,
        }
    }
}

/// リソースレスポンス
#[derive(Debug, Serialize)]
pub struct ResourceResponse {
    pub resource_id: String,
    pub kind: String,
    pub category: String,
    pub display_name: String,
    pub operational_status: String,
    pub hourly_rate: Option<Decimal>,
    pub location: Option<String>,
}

impl From<Resource> for ResourceResponse {
    fn from(resource: Resource) -> Self {
        Self {
            resource_id: resource.id.to_string(),
            kind: resource.kind.as_str().to_string(),
            category: resource.category,
            display_name: resource.display_name,
            operational_status: resource.operational_status.as_str().to_string(),
            hourly_rate: resource.hourly_rate,
            location: resource.location,
        }
    }
}

/// 空き状況レスポンス
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub resource_id: String,
    pub year: i32,
    pub month: u32,
    /// 占有中の予約がある日付
    pub booked_dates: Vec<NaiveDate>,
}

/// 返却候補レスポンス（POST /scans/return）
#[derive(Debug, Serialize)]
pub struct ReturnCandidatesResponse {
    pub resource: ResourceResponse,
    pub bookings: Vec<BookingResponse>,
}

impl From<ReturnCandidates> for ReturnCandidatesResponse {
    fn from(candidates: ReturnCandidates) -> Self {
        Self {
            resource: candidates.resource.into(),
            bookings: candidates.bookings.into_iter().map(Into::into).collect(),
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// 枠の衝突時のみ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_booking_id: Option<Uuid>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            conflicting_booking_id: None,
        }
    }
}
