use chrono::{DateTime, Utc};

use crate::domain::{
    self, Actor, Booking, BookingId, BookingStatus, BookingValidationError, InvalidTransition,
    NewBooking, TimeWindow, UserId, commands::*,
};
use crate::ports::{DuplicateProbe, StatusChange, StoreError};

use super::conflict::{self, ConflictCheck};
use super::dependencies::{ServiceDependencies, bounded};
use super::errors::{ReservationError, Result};

/// リソースを予約する
///
/// ビジネスルール：
/// - 予約日はラボの暦で今日以降
/// - リソースの稼働状態がAvailableであること
/// - 同じ日付で占有中の予約と時間帯が重ならないこと
///
/// # 一貫性保証
///
/// 衝突チェックと保存はリソース単位のロックの内側で行い、
/// ストアも挿入時に重複を再確認する（複数インスタンスでも二重予約しない）。
/// 予約と作成ログは同じ単位でコミットされる。
///
/// # 冪等性
///
/// 冪等キー付きの再送、または同じ枠・同じ申請者の直近の再送は
/// 新しい予約を作らず、既存の予約を返す。
/// 同じ冪等キーで別の枠を求めた場合は`IdempotencyKeyReused`で拒否する。
///
/// # エラー
/// - Validation: 過去日付、冪等キーの使い回し
/// - ResourceNotFound / ResourceUnavailable: リソースが予約できない
/// - SlotConflict: 既存予約と重なる
/// - StoreUnavailable / Timeout: 一時障害（同じ内容で再送してよい）
/// - AuditWriteFailure: ログを書けなかった（予約は作成されていない）
#[tracing::instrument(
    skip(deps, cmd),
    fields(resource_id = %cmd.resource_id, requester = %cmd.requester.actor_id, date = %cmd.date)
)]
pub async fn create_booking(deps: &ServiceDependencies, cmd: RequestBooking) -> Result<Booking> {
    let settings = &deps.settings;
    let today = settings.today(cmd.requested_at);

    // 1. 予約日の検証（外部呼び出しの前に弾く）
    domain::booking::validate_booking_date(cmd.date, today)?;

    // 2. リソース単位のロックを取得
    let _guard = bounded(
        settings.store_timeout,
        "acquire resource lock",
        deps.resource_locks.lock(&cmd.resource_id),
    )
    .await?;

    // 3. 再送の検出
    let probe = DuplicateProbe {
        resource_id: cmd.resource_id.clone(),
        requester_id: cmd.requester.actor_id.clone(),
        date: cmd.date,
        start_time: cmd.start_time,
        duration_hours: cmd.duration_hours,
        idempotency_key: cmd.idempotency_key.clone(),
        created_since: cmd.requested_at - settings.dedupe_window,
    };
    let duplicate = bounded(
        settings.store_timeout,
        "look up duplicate booking",
        deps.booking_store.find_duplicate(&probe),
    )
    .await??;
    if let Some(existing) = duplicate {
        if !probe.same_slot_as(&existing) {
            tracing::warn!(booking_id = %existing.id, "Idempotency key reused for a different request");
            return Err(BookingValidationError::IdempotencyKeyReused(
                probe.idempotency_key.clone().unwrap_or_default(),
            )
            .into());
        }
        tracing::info!(booking_id = %existing.id, "Replayed booking request, returning existing booking");
        return Ok(existing);
    }

    // 4. ロックの内側で稼働状態と衝突を確認
    let window = TimeWindow::new(cmd.start_time, cmd.duration_hours);
    let (resource, outcome) =
        conflict::evaluate(deps, &cmd.resource_id, cmd.date, &window).await?;
    match outcome {
        ConflictCheck::Clear => {}
        ConflictCheck::Conflict(existing) => {
            tracing::info!(conflicting_booking = %existing, "Slot already booked");
            return Err(ReservationError::SlotConflict { existing });
        }
        ConflictCheck::ResourceUnavailable(status) => {
            return Err(ReservationError::ResourceUnavailable {
                resource_id: cmd.resource_id,
                status,
            });
        }
    }

    // 5. ドメイン層の純粋関数を呼び出し
    let (booking, entry) = domain::booking::create_booking(
        NewBooking {
            resource: &resource,
            requester: &cmd.requester,
            date: cmd.date,
            start_time: cmd.start_time,
            duration_hours: cmd.duration_hours,
            idempotency_key: cmd.idempotency_key,
        },
        today,
        cmd.requested_at,
    )?;

    // 6. 予約と作成ログを保存
    match bounded(
        settings.store_timeout,
        "store booking",
        deps.booking_store.insert(booking.clone(), entry),
    )
    .await?
    {
        Ok(()) => {}
        Err(StoreError::AuditWrite(source)) => {
            tracing::error!(error = %source, "Audit write failed, booking was not created");
            return Err(ReservationError::AuditWriteFailure(source));
        }
        // 同じキーの別リクエストが先に保存されていれば、その予約を返す
        Err(e @ (StoreError::SlotTaken(_) | StoreError::IdempotencyKeyTaken(_)))
            if probe.idempotency_key.is_some() =>
        {
            let winner = bounded(
                settings.store_timeout,
                "look up duplicate booking",
                deps.booking_store.find_duplicate(&probe),
            )
            .await??;
            return match winner {
                Some(existing) if probe.same_slot_as(&existing) => {
                    tracing::info!(booking_id = %existing.id, "Concurrent request with the same key won, returning its booking");
                    Ok(existing)
                }
                Some(_) => Err(BookingValidationError::IdempotencyKeyReused(
                    probe.idempotency_key.clone().unwrap_or_default(),
                )
                .into()),
                None => Err(e.into()),
            };
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(booking_id = %booking.id, "Booking created");
    Ok(booking)
}

/// IDで予約を取得する
pub async fn get_booking(deps: &ServiceDependencies, booking_id: BookingId) -> Result<Booking> {
    bounded(
        deps.settings.store_timeout,
        "load booking",
        deps.booking_store.get(booking_id),
    )
    .await??
    .ok_or(ReservationError::BookingNotFound(booking_id))
}

/// 申請者の予約一覧（予約日の新しい順）
pub async fn list_bookings_for_requester(
    deps: &ServiceDependencies,
    requester_id: &UserId,
) -> Result<Vec<Booking>> {
    Ok(bounded(
        deps.settings.store_timeout,
        "list bookings for requester",
        deps.booking_store.find_by_requester(requester_id),
    )
    .await??)
}

/// 全予約の一覧（予約日の新しい順）
pub async fn list_all_bookings(deps: &ServiceDependencies) -> Result<Vec<Booking>> {
    Ok(bounded(
        deps.settings.store_timeout,
        "list bookings",
        deps.booking_store.list_all(),
    )
    .await??)
}

/// 予約の状態を遷移させる
///
/// 遷移表と操作者の権限を確認し、「現在のステータスが読み取り時点のまま」の条件付きで
/// 状態とログを同時に保存する。
/// 同時に別の遷移が先に確定した場合は、確定後のステータスからの`InvalidTransition`になる。
///
/// # エラー
/// - BookingNotFound: 予約がない
/// - InvalidTransition: 遷移表にない（終端状態からの遷移、競合負けを含む）
/// - NotPermitted: 操作者に権限がない
/// - AuditWriteFailure: ログを書けなかった（状態は変わっていない）
#[tracing::instrument(
    skip(deps, cmd),
    fields(booking_id = %cmd.booking_id, target = %cmd.target, actor = %cmd.actor.actor_id)
)]
pub async fn transition_booking(
    deps: &ServiceDependencies,
    cmd: TransitionBooking,
) -> Result<Booking> {
    // 1. 現在の予約を読み込む
    let booking = get_booking(deps, cmd.booking_id).await?;

    // 2. ドメイン層で遷移を計画
    let (planned, entry) = domain::booking::plan_transition(
        &booking,
        cmd.target,
        &cmd.actor,
        cmd.note,
        cmd.requested_at,
    )
    .inspect_err(|e| tracing::warn!(error = %e, "Transition rejected"))?;

    // 3. 条件付きで保存
    let change = StatusChange {
        booking_id: booking.id,
        expected: booking.status,
        new: planned.status,
        changed_at: planned.status_changed_at,
    };
    let stored = bounded(
        deps.settings.store_timeout,
        "apply booking transition",
        deps.booking_store.apply_transition(change, entry),
    )
    .await?;

    match stored {
        Ok(updated) => {
            tracing::info!(from = %booking.status, to = %updated.status, "Booking transitioned");
            Ok(updated)
        }
        Err(StoreError::StatusMismatch { actual, .. }) => {
            tracing::warn!(%actual, "Lost race on booking transition");
            Err(InvalidTransition {
                from: actual,
                to: cmd.target,
            }
            .into())
        }
        Err(StoreError::AuditWrite(source)) => {
            tracing::error!(error = %source, "Audit write failed, transition rolled back");
            Err(ReservationError::AuditWriteFailure(source))
        }
        Err(e) => Err(e.into()),
    }
}

/// 予約を承認する（pending → confirmed、管理者のみ）
pub async fn confirm_booking(
    deps: &ServiceDependencies,
    booking_id: BookingId,
    actor: Actor,
    note: Option<String>,
    requested_at: DateTime<Utc>,
) -> Result<Booking> {
    transition_booking(
        deps,
        TransitionBooking {
            booking_id,
            target: BookingStatus::Confirmed,
            actor,
            note,
            requested_at,
        },
    )
    .await
}

/// 予約を取り消す
///
/// pending は申請者本人または管理者、confirmed は管理者のみ。
pub async fn cancel_booking(
    deps: &ServiceDependencies,
    booking_id: BookingId,
    actor: Actor,
    note: Option<String>,
    requested_at: DateTime<Utc>,
) -> Result<Booking> {
    transition_booking(
        deps,
        TransitionBooking {
            booking_id,
            target: BookingStatus::Cancelled,
            actor,
            note,
            requested_at,
        },
    )
    .await
}
