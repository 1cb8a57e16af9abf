use crate::domain::{
    self, BookingId, CivilDate, DurationHours, OperationalStatus, Resource, ResourceId, StartTime,
    TimeWindow,
};

use super::dependencies::{ServiceDependencies, bounded};
use super::errors::{ReservationError, Result};

/// 衝突チェックの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    /// 予約可能
    Clear,
    /// 既存予約と時間帯が重なる（最も古い予約のID）
    Conflict(BookingId),
    /// リソースが予約を受け付けない状態
    ResourceUnavailable(OperationalStatus),
}

/// 枠が予約可能か確認する
///
/// ビジネスルール：
/// - リソースが存在すること
/// - リソースの稼働状態がAvailableであること
/// - 同じ日付で、占有中（pending / confirmed）の予約と時間帯が重ならないこと
///
/// 読み取りのみ。予約作成時はリソースロックの内側で再評価される。
///
/// # エラー
/// - ResourceNotFound: リソースがカタログにない
/// - StoreUnavailable / Timeout: ストアまたはカタログに届かない
pub async fn check_conflict(
    deps: &ServiceDependencies,
    resource_id: &ResourceId,
    date: CivilDate,
    start_time: StartTime,
    duration_hours: DurationHours,
) -> Result<ConflictCheck> {
    let window = TimeWindow::new(start_time, duration_hours);
    let (_, outcome) = evaluate(deps, resource_id, date, &window).await?;
    Ok(outcome)
}

/// リソースを取得して衝突を評価する
///
/// 予約作成でリソース情報を使い回すため、リソースも返す。
pub(super) async fn evaluate(
    deps: &ServiceDependencies,
    resource_id: &ResourceId,
    date: CivilDate,
    window: &TimeWindow,
) -> Result<(Resource, ConflictCheck)> {
    let resource = load_resource(deps, resource_id).await?;

    if !resource.accepts_bookings() {
        let status = resource.operational_status;
        return Ok((resource, ConflictCheck::ResourceUnavailable(status)));
    }

    let existing = bounded(
        deps.settings.store_timeout,
        "load bookings for conflict check",
        deps.booking_store.find_by_resource(resource_id, date, date),
    )
    .await??;

    let outcome = match domain::booking::find_conflict(&existing, resource_id, date, window) {
        Some(existing) => ConflictCheck::Conflict(existing),
        None => ConflictCheck::Clear,
    };

    Ok((resource, outcome))
}

/// カタログから最新のリソース情報を取得する
///
/// 稼働状態を確認するため、キャッシュは使わない。
pub(super) async fn load_resource(
    deps: &ServiceDependencies,
    resource_id: &ResourceId,
) -> Result<Resource> {
    bounded(
        deps.settings.lookup_timeout,
        "look up resource",
        deps.resource_catalog.get_resource(resource_id),
    )
    .await?
    .map_err(ReservationError::StoreUnavailable)?
    .ok_or_else(|| ReservationError::ResourceNotFound(resource_id.clone()))
}
