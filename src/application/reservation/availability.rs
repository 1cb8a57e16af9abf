use std::collections::BTreeSet;

use chrono::{Months, NaiveDate};

use crate::domain::{self, Booking, BookingValidationError, CivilDate, ResourceId};

use super::dependencies::{ServiceDependencies, bounded};
use super::errors::Result;

/// 指定月に占有されている日付を返す
///
/// 占有とみなすのは pending / confirmed の予約のみ。
/// 取消済み・返却済みの予約は枠を解放する。
///
/// # エラー
/// - Validation(InvalidMonth): 月が1〜12の範囲外
#[tracing::instrument(skip(deps), fields(resource_id = %resource_id))]
pub async fn availability(
    deps: &ServiceDependencies,
    resource_id: &ResourceId,
    year: i32,
    month: u32,
) -> Result<BTreeSet<CivilDate>> {
    let (first, last) = month_bounds(year, month)?;

    let bookings = bounded(
        deps.settings.store_timeout,
        "load bookings for availability",
        deps.booking_store.find_by_resource(resource_id, first, last),
    )
    .await??;

    Ok(domain::booking::occupied_dates(&bookings, year, month))
}

/// 指定日のリソースの予約一覧（占有中のみ、開始時刻順）
pub async fn bookings_on(
    deps: &ServiceDependencies,
    resource_id: &ResourceId,
    date: CivilDate,
) -> Result<Vec<Booking>> {
    let mut bookings = bounded(
        deps.settings.store_timeout,
        "load bookings for date",
        deps.booking_store.find_by_resource(resource_id, date, date),
    )
    .await??;

    bookings.retain(|b| b.status.is_active() && b.date == date);
    domain::booking::sort_oldest_first(&mut bookings);
    Ok(bookings)
}

/// 月の初日と末日
fn month_bounds(year: i32, month: u32) -> std::result::Result<(NaiveDate, NaiveDate), BookingValidationError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(BookingValidationError::InvalidMonth { year, month })?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or(BookingValidationError::InvalidMonth { year, month })?;
    Ok((first, last))
}
