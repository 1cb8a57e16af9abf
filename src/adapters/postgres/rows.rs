use crate::domain::{
    Booking, BookingId, BookingLogEntry, BookingSnapshot, DurationHours, LogEntryId, Resource,
    ResourceId, ResourceLabel, StartTime, UserId,
};
use crate::ports::{StoreError, StoreResult};
use sqlx::{Row, postgres::PgRow};
use std::str::FromStr;

/// bookingsテーブルの列（SELECT用）
pub(super) const BOOKING_COLUMNS: &str = r#"
    id,
    resource_id,
    resource_kind,
    resource_name,
    resource_category,
    resource_location,
    requester_id,
    booking_date,
    start_minute,
    duration_hours,
    status,
    total_cost,
    idempotency_key,
    created_at,
    status_changed_at
"#;

/// booking_logsテーブルの列（SELECT用）
pub(super) const LOG_COLUMNS: &str = r#"
    id,
    booking_id,
    resource_id,
    resource_kind,
    requester_id,
    previous_status,
    new_status,
    action,
    actor_id,
    note,
    details,
    occurred_at
"#;

/// sqlxのエラーをストアのエラーに変換する
///
/// 列の型・値が読めないものは破損、それ以外は接続障害として扱う。
pub(super) fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupted(err.to_string()),
        other => StoreError::Unavailable(Box::new(other)),
    }
}

fn corrupted(column: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupted(format!("{column}: {detail}"))
}

fn parse_column<T>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(store_error)?;
    T::from_str(&raw).map_err(|e| corrupted(column, e))
}

fn resource_id_column(row: &PgRow, column: &str) -> StoreResult<ResourceId> {
    let raw: String = row.try_get(column).map_err(store_error)?;
    ResourceId::parse(raw.trim()).map_err(|e| corrupted(column, e))
}

/// PostgreSQLの行データをBookingに変換する
pub(super) fn map_row_to_booking(row: &PgRow) -> StoreResult<Booking> {
    let start_minute: i16 = row.try_get("start_minute").map_err(store_error)?;
    let start_time = u16::try_from(start_minute)
        .map_err(|e| corrupted("start_minute", e))
        .and_then(|m| StartTime::from_minutes(m).map_err(|e| corrupted("start_minute", e)))?;

    let duration: i16 = row.try_get("duration_hours").map_err(store_error)?;
    let duration_hours =
        DurationHours::try_from(i64::from(duration)).map_err(|e| corrupted("duration_hours", e))?;

    Ok(Booking {
        id: BookingId::from_uuid(row.try_get("id").map_err(store_error)?),
        resource_id: resource_id_column(row, "resource_id")?,
        resource_kind: parse_column(row, "resource_kind")?,
        resource_label: ResourceLabel {
            name: row.try_get("resource_name").map_err(store_error)?,
            category: row.try_get("resource_category").map_err(store_error)?,
            location: row.try_get("resource_location").map_err(store_error)?,
        },
        requester_id: UserId::new(row.try_get::<String, _>("requester_id").map_err(store_error)?),
        date: row.try_get("booking_date").map_err(store_error)?,
        start_time,
        duration_hours,
        status: parse_column(row, "status")?,
        total_cost: row.try_get("total_cost").map_err(store_error)?,
        idempotency_key: row.try_get("idempotency_key").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
        status_changed_at: row.try_get("status_changed_at").map_err(store_error)?,
    })
}

/// PostgreSQLの行データをBookingLogEntryに変換する
pub(super) fn map_row_to_log_entry(row: &PgRow) -> StoreResult<BookingLogEntry> {
    let previous_status: Option<String> = row.try_get("previous_status").map_err(store_error)?;
    let previous_status = previous_status
        .map(|s| s.parse().map_err(|e| corrupted("previous_status", e)))
        .transpose()?;

    let details: serde_json::Value = row.try_get("details").map_err(store_error)?;
    let details: BookingSnapshot =
        serde_json::from_value(details).map_err(|e| corrupted("details", e))?;

    Ok(BookingLogEntry {
        id: LogEntryId::from_uuid(row.try_get("id").map_err(store_error)?),
        booking_id: BookingId::from_uuid(row.try_get("booking_id").map_err(store_error)?),
        resource_id: resource_id_column(row, "resource_id")?,
        resource_kind: parse_column(row, "resource_kind")?,
        requester_id: UserId::new(row.try_get::<String, _>("requester_id").map_err(store_error)?),
        previous_status,
        new_status: parse_column(row, "new_status")?,
        action: parse_column(row, "action")?,
        actor_id: UserId::new(row.try_get::<String, _>("actor_id").map_err(store_error)?),
        note: row.try_get("note").map_err(store_error)?,
        details,
        occurred_at: row.try_get("occurred_at").map_err(store_error)?,
    })
}

/// PostgreSQLの行データをResourceに変換する
pub(super) fn map_row_to_resource(row: &PgRow) -> StoreResult<Resource> {
    Ok(Resource {
        id: resource_id_column(row, "id")?,
        kind: parse_column(row, "kind")?,
        category: row.try_get("category").map_err(store_error)?,
        display_name: row.try_get("display_name").map_err(store_error)?,
        operational_status: parse_column(row, "operational_status")?,
        hourly_rate: row.try_get("hourly_rate").map_err(store_error)?,
        location: row.try_get("location").map_err(store_error)?,
    })
}
