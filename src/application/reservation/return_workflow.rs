use crate::domain::{self, Booking, BookingStatus, Resource, ResourceId, commands::*};

use super::dependencies::{ServiceDependencies, bounded};
use super::errors::Result;
use super::lifecycle;
use super::scan_resolver;

/// スキャン経由の返却で記録する既定のメモ
pub const SCAN_RETURN_NOTE: &str = "Returned via QR scan";

/// スキャンで特定したリソースと、返却対象になりうる予約
#[derive(Debug, Clone)]
pub struct ReturnCandidates {
    pub resource: Resource,
    pub bookings: Vec<Booking>,
}

/// リソースの占有中（pending / confirmed）の予約を古い順で返す
pub async fn active_bookings_for(
    deps: &ServiceDependencies,
    resource_id: &ResourceId,
) -> Result<Vec<Booking>> {
    let mut bookings = bounded(
        deps.settings.store_timeout,
        "load active bookings",
        deps.booking_store.find_active_by_resource(resource_id),
    )
    .await??;

    bookings.retain(|b| b.status.is_active());
    domain::booking::sort_oldest_first(&mut bookings);
    Ok(bookings)
}

/// 返却を確定する（confirmed → completed）
///
/// スキャン経由でも手動でも同じ遷移を通る。
/// pending の予約は返却できない（自動で承認されることはない）。
///
/// # エラー
/// - BookingNotFound: 予約がない
/// - InvalidTransition: confirmed 以外からの返却
/// - NotPermitted: 管理者以外
pub async fn confirm_return(deps: &ServiceDependencies, cmd: ConfirmReturn) -> Result<Booking> {
    lifecycle::transition_booking(
        deps,
        TransitionBooking {
            booking_id: cmd.booking_id,
            target: BookingStatus::Completed,
            actor: cmd.actor,
            note: cmd.note,
            requested_at: cmd.returned_at,
        },
    )
    .await
}

/// スキャン経由の返却を確定する
///
/// メモがなければ`SCAN_RETURN_NOTE`を記録する。遷移は`confirm_return`と共通。
pub async fn confirm_scanned_return(
    deps: &ServiceDependencies,
    cmd: ConfirmReturn,
) -> Result<Booking> {
    let note = cmd.note.clone().or_else(|| Some(SCAN_RETURN_NOTE.to_string()));
    confirm_return(deps, ConfirmReturn { note, ..cmd }).await
}

/// スキャンしたペイロードから返却候補を探す
///
/// 結果は読み取りのみ。返却の確定は`confirm_return`で別に行う。
#[tracing::instrument(skip(deps, raw_payload))]
pub async fn scan_for_return(
    deps: &ServiceDependencies,
    raw_payload: &str,
) -> Result<ReturnCandidates> {
    let resource = scan_resolver::resolve_scan(deps, raw_payload).await?;
    let bookings = active_bookings_for(deps, &resource.id).await?;
    tracing::debug!(resource_id = %resource.id, candidates = bookings.len(), "Return candidates found");
    Ok(ReturnCandidates { resource, bookings })
}
