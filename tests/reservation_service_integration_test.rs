mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use futures::{StreamExt, TryStreamExt};
use rust_decimal_macros::dec;
use rusty_lab_reservation::application::reservation::{
    self, ConflictCheck, EngineSettings, ReservationError, SCAN_RETURN_NOTE,
};
use rusty_lab_reservation::domain::commands::ConfirmReturn;
use rusty_lab_reservation::domain::{
    Actor, AuditQuery, BookingStatus, BookingValidationError, DurationHours, LifecycleAction,
    OperationalStatus, ResourceId, ResourceKind, StartTime,
};

const MICROSCOPE_ID: &str = "507f1f77bcf86cd799439011";
const CENTRIFUGE_ID: &str = "507f1f77bcf86cd799439012";
const SEMINAR_ROOM_ID: &str = "65a1c0ffee0000000000beef";

/// 顕微鏡・遠心分離機・セミナー室を登録したエンジンを作成
fn setup() -> MemoryEngine {
    let engine = memory_engine(EngineSettings::default());
    engine
        .catalog
        .add_resource(equipment(MICROSCOPE_ID, "Confocal Microscope"));
    engine
        .catalog
        .add_resource(equipment(CENTRIFUGE_ID, "Benchtop Centrifuge"));
    engine
        .catalog
        .add_resource(venue(SEMINAR_ROOM_ID, "Seminar Room 3A", dec!(250.00)));
    engine
}

fn microscope() -> ResourceId {
    ResourceId::parse(MICROSCOPE_ID).unwrap()
}

fn admin() -> Actor {
    Actor::admin("lab-admin")
}

// ============================================================================
// 正常系: 予約から返却まで
// ============================================================================

#[tokio::test]
async fn test_booking_lifecycle_from_request_to_scanned_return() {
    let engine = setup();
    let deps = &engine.deps;
    let requested_at = at(2025, 5, 20, 1, 0);

    // Arrange: alice が 6/1 09:00 から2時間予約
    let booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, requested_at),
    )
    .await
    .expect("booking should be created");
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.resource_label.name, "Confocal Microscope");

    // 管理者が承認
    let confirmed =
        reservation::confirm_booking(deps, booking.id, admin(), None, at(2025, 5, 20, 2, 0))
            .await
            .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    // 重なる時間帯の予約は既存予約のIDつきで拒否される
    let result = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("bob"), date(2025, 6, 1), "10:00", 1, requested_at),
    )
    .await;
    match result {
        Err(ReservationError::SlotConflict { existing }) => assert_eq!(existing, booking.id),
        other => panic!("expected SlotConflict, got {:?}", other),
    }

    // Act: QRスキャンから返却
    let payload = format!(r#"{{"_id": {{"$oid": "{}"}}, "name": "Confocal Microscope"}}"#, MICROSCOPE_ID);
    let candidates = reservation::scan_for_return(deps, &payload).await.unwrap();
    assert_eq!(candidates.resource.id, microscope());
    assert_eq!(candidates.bookings.len(), 1);
    assert_eq!(candidates.bookings[0].id, booking.id);

    let returned = reservation::confirm_scanned_return(
        deps,
        ConfirmReturn {
            booking_id: booking.id,
            actor: admin(),
            note: None,
            returned_at: at(2025, 6, 1, 3, 0),
        },
    )
    .await
    .unwrap();

    // Assert
    assert_eq!(returned.status, BookingStatus::Completed);

    let booked = reservation::availability(deps, &microscope(), 2025, 6)
        .await
        .unwrap();
    assert!(!booked.contains(&date(2025, 6, 1)));

    let completions = reservation::query_audit_log(
        deps,
        AuditQuery {
            booking_id: Some(booking.id),
            action: Some(LifecycleAction::Complete),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].previous_status, Some(BookingStatus::Confirmed));
    assert_eq!(completions[0].new_status, BookingStatus::Completed);
    assert_eq!(completions[0].note.as_deref(), Some(SCAN_RETURN_NOTE));
    assert_eq!(completions[0].actor_id.as_str(), "lab-admin");
}

#[tokio::test]
async fn test_back_to_back_bookings_do_not_conflict() {
    let engine = setup();
    let requested_at = at(2025, 5, 20, 1, 0);

    reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, requested_at),
    )
    .await
    .unwrap();

    let second = reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("bob"), date(2025, 6, 1), "11:00", 1, requested_at),
    )
    .await;

    assert!(second.is_ok());
    let on_day = reservation::bookings_on(&engine.deps, &microscope(), date(2025, 6, 1))
        .await
        .unwrap();
    assert_eq!(on_day.len(), 2);
    assert_eq!(on_day[0].start_time, StartTime::parse("09:00").unwrap());
}

#[tokio::test]
async fn test_cancelled_booking_frees_the_slot() {
    let engine = setup();
    let deps = &engine.deps;
    let requested_at = at(2025, 5, 20, 1, 0);

    let booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 3), "13:00", 3, requested_at),
    )
    .await
    .unwrap();

    // 申請者本人が pending を取消
    let cancelled = reservation::cancel_booking(
        deps,
        booking.id,
        Actor::member("alice"),
        Some("plans changed".to_string()),
        requested_at,
    )
    .await
    .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let check = reservation::check_conflict(
        deps,
        &microscope(),
        date(2025, 6, 3),
        StartTime::parse("14:00").unwrap(),
        DurationHours::try_from(1u8).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(check, ConflictCheck::Clear);

    let booked = reservation::availability(deps, &microscope(), 2025, 6)
        .await
        .unwrap();
    assert!(booked.is_empty());
}

#[tokio::test]
async fn test_venue_booking_carries_total_cost() {
    let engine = setup();
    let room = ResourceId::parse(SEMINAR_ROOM_ID).unwrap();

    let booking = reservation::create_booking(
        &engine.deps,
        request(&room, Actor::member("carol"), date(2025, 6, 10), "14:00", 3, at(2025, 5, 20, 1, 0)),
    )
    .await
    .unwrap();

    assert_eq!(booking.resource_kind, ResourceKind::Venue);
    assert_eq!(booking.total_cost, Some(dec!(750.00)));
    assert_eq!(booking.resource_label.location.as_deref(), Some("Building C, 3F"));
}

// ============================================================================
// 日付の扱い
// ============================================================================

#[tokio::test]
async fn test_past_date_is_judged_on_the_lab_calendar() {
    let engine = setup();

    // UTC では 6/1 17:00 だが、ラボ（+08:00）では既に 6/2
    let result = reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 1, at(2025, 6, 1, 17, 0)),
    )
    .await;

    match result {
        Err(ReservationError::Validation(BookingValidationError::DateInPast { date: d, today })) => {
            assert_eq!(d, date(2025, 6, 1));
            assert_eq!(today, date(2025, 6, 2));
        }
        other => panic!("expected DateInPast, got {:?}", other),
    }
    assert!(reservation::list_all_bookings(&engine.deps).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_booking_today_is_accepted() {
    let engine = setup();

    // UTC では 5/31 だが、ラボでは 6/1 の朝
    let booking = reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "18:00", 1, at(2025, 5, 31, 23, 0)),
    )
    .await;

    assert!(booking.is_ok());
}

#[tokio::test]
async fn test_late_evening_booking_stays_on_its_calendar_date() {
    let engine = setup();

    reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 30), "23:00", 1, at(2025, 5, 20, 1, 0)),
    )
    .await
    .unwrap();

    let june = reservation::availability(&engine.deps, &microscope(), 2025, 6)
        .await
        .unwrap();
    let july = reservation::availability(&engine.deps, &microscope(), 2025, 7)
        .await
        .unwrap();

    assert_eq!(june.into_iter().collect::<Vec<_>>(), vec![date(2025, 6, 30)]);
    assert!(july.is_empty());
}

#[tokio::test]
async fn test_availability_rejects_invalid_month() {
    let engine = setup();

    let result = reservation::availability(&engine.deps, &microscope(), 2025, 13).await;

    assert!(matches!(
        result,
        Err(ReservationError::Validation(BookingValidationError::InvalidMonth { month: 13, .. }))
    ));
}

// ============================================================================
// リソースの状態
// ============================================================================

#[tokio::test]
async fn test_resource_under_maintenance_cannot_be_booked() {
    let engine = setup();
    let centrifuge = ResourceId::parse(CENTRIFUGE_ID).unwrap();
    engine
        .catalog
        .set_status(&centrifuge, OperationalStatus::Maintenance);

    let result = reservation::create_booking(
        &engine.deps,
        request(&centrifuge, Actor::member("alice"), date(2025, 6, 1), "09:00", 1, at(2025, 5, 20, 1, 0)),
    )
    .await;

    match result {
        Err(ReservationError::ResourceUnavailable { resource_id, status }) => {
            assert_eq!(resource_id, centrifuge);
            assert_eq!(status, OperationalStatus::Maintenance);
        }
        other => panic!("expected ResourceUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_resource_is_not_found() {
    let engine = setup();
    let unknown = ResourceId::parse("aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();

    let result = reservation::create_booking(
        &engine.deps,
        request(&unknown, Actor::member("alice"), date(2025, 6, 1), "09:00", 1, at(2025, 5, 20, 1, 0)),
    )
    .await;

    assert!(matches!(result, Err(ReservationError::ResourceNotFound(id)) if id == unknown));
}

// ============================================================================
// 状態遷移と権限
// ============================================================================

#[tokio::test]
async fn test_transition_rules_and_permissions() {
    let engine = setup();
    let deps = &engine.deps;
    let now = at(2025, 5, 20, 1, 0);

    let booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 5), "09:00", 1, now),
    )
    .await
    .unwrap();

    // 一般利用者は承認できない
    let result = reservation::confirm_booking(deps, booking.id, Actor::member("alice"), None, now).await;
    assert!(matches!(result, Err(ReservationError::NotPermitted(_))));

    // 他人の pending は取消できない
    let result = reservation::cancel_booking(deps, booking.id, Actor::member("mallory"), None, now).await;
    assert!(matches!(result, Err(ReservationError::NotPermitted(_))));

    // pending は返却できない
    let result = reservation::confirm_return(
        deps,
        ConfirmReturn {
            booking_id: booking.id,
            actor: admin(),
            note: None,
            returned_at: now,
        },
    )
    .await;
    match result {
        Err(ReservationError::InvalidTransition(e)) => {
            assert_eq!(e.from, BookingStatus::Pending);
            assert_eq!(e.to, BookingStatus::Completed);
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }

    reservation::confirm_booking(deps, booking.id, admin(), None, now)
        .await
        .unwrap();

    // confirmed は申請者本人でも取消できない
    let result = reservation::cancel_booking(deps, booking.id, Actor::member("alice"), None, now).await;
    assert!(matches!(result, Err(ReservationError::NotPermitted(_))));

    // 管理者は取消できる。二度目は終端状態からの遷移
    reservation::cancel_booking(deps, booking.id, admin(), None, now)
        .await
        .unwrap();
    let result = reservation::cancel_booking(deps, booking.id, admin(), None, now).await;
    assert!(matches!(
        result,
        Err(ReservationError::InvalidTransition(e))
            if e.from == BookingStatus::Cancelled && e.to == BookingStatus::Cancelled
    ));

    // 拒否された遷移はログに残らない
    let logs = reservation::query_audit_log(
        deps,
        AuditQuery {
            booking_id: Some(booking.id),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].action, LifecycleAction::Cancel);
    assert_eq!(logs[2].action, LifecycleAction::Create);
}

#[tokio::test]
async fn test_unknown_booking_is_not_found() {
    let engine = setup();
    let missing = rusty_lab_reservation::domain::BookingId::new();

    let result = reservation::confirm_booking(&engine.deps, missing, admin(), None, at(2025, 5, 20, 1, 0)).await;

    assert!(matches!(result, Err(ReservationError::BookingNotFound(id)) if id == missing));
}

// ============================================================================
// 同時実行
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_the_same_slot_book_it_once() {
    let engine = setup();
    let deps = Arc::new(engine.deps.clone());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let deps = deps.clone();
            tokio::spawn(async move {
                reservation::create_booking(
                    &deps,
                    request(
                        &microscope(),
                        Actor::member(format!("member-{i}")),
                        date(2025, 6, 1),
                        "09:00",
                        2,
                        at(2025, 5, 20, 1, 0),
                    ),
                )
                .await
            })
        })
        .collect();

    let mut created = Vec::new();
    let mut conflicts = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(booking) => created.push(booking),
            Err(ReservationError::SlotConflict { existing }) => conflicts.push(existing),
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(created.len(), 1);
    assert_eq!(conflicts.len(), 7);
    assert!(conflicts.iter().all(|id| *id == created[0].id));

    let stored = reservation::list_all_bookings(&deps).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_for_different_resources_all_succeed() {
    let engine = setup();
    let deps = Arc::new(engine.deps.clone());
    let resources = [MICROSCOPE_ID, CENTRIFUGE_ID, SEMINAR_ROOM_ID];

    let tasks: Vec<_> = resources
        .iter()
        .map(|id| {
            let deps = deps.clone();
            let resource_id = ResourceId::parse(id).unwrap();
            tokio::spawn(async move {
                reservation::create_booking(
                    &deps,
                    request(&resource_id, Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0)),
                )
                .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_apply_once() {
    let engine = setup();
    let deps = Arc::new(engine.deps.clone());
    let booking = reservation::create_booking(
        &deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0)),
    )
    .await
    .unwrap();

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let deps = deps.clone();
            tokio::spawn(async move {
                reservation::confirm_booking(
                    &deps,
                    booking.id,
                    Actor::admin(format!("admin-{i}")),
                    None,
                    at(2025, 5, 20, 2, 0),
                )
                .await
            })
        })
        .collect();

    let mut confirmed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => confirmed += 1,
            Err(ReservationError::InvalidTransition(e)) => {
                assert_eq!(e.from, BookingStatus::Confirmed);
                assert_eq!(e.to, BookingStatus::Confirmed);
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(confirmed, 1);

    let confirmations = reservation::query_audit_log(
        &deps,
        AuditQuery {
            booking_id: Some(booking.id),
            action: Some(LifecycleAction::Confirm),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(confirmations.len(), 1);
}

// ============================================================================
// 再送の扱い
// ============================================================================

#[tokio::test]
async fn test_replayed_request_returns_the_existing_booking() {
    let engine = setup();
    let cmd = request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0));

    let first = reservation::create_booking(&engine.deps, cmd.clone()).await.unwrap();
    let replay = reservation::create_booking(
        &engine.deps,
        rusty_lab_reservation::domain::commands::RequestBooking {
            requested_at: at(2025, 5, 20, 1, 1),
            ..cmd
        },
    )
    .await
    .unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(reservation::list_all_bookings(&engine.deps).await.unwrap().len(), 1);
    let logs = reservation::query_audit_log(&engine.deps, AuditQuery::default(), None)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_replay_outside_the_window_is_a_conflict() {
    let engine = setup();
    let cmd = request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0));

    let first = reservation::create_booking(&engine.deps, cmd.clone()).await.unwrap();
    let late = reservation::create_booking(
        &engine.deps,
        rusty_lab_reservation::domain::commands::RequestBooking {
            requested_at: at(2025, 5, 20, 1, 10),
            ..cmd
        },
    )
    .await;

    assert!(matches!(late, Err(ReservationError::SlotConflict { existing }) if existing == first.id));
}

#[tokio::test]
async fn test_idempotency_key_matches_regardless_of_age() {
    let engine = setup();
    let mut cmd = request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0));
    cmd.idempotency_key = Some("req-42".to_string());

    let first = reservation::create_booking(&engine.deps, cmd.clone()).await.unwrap();
    cmd.requested_at = at(2025, 5, 21, 1, 0);
    let replay = reservation::create_booking(&engine.deps, cmd).await.unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(replay.idempotency_key.as_deref(), Some("req-42"));
}

#[tokio::test]
async fn test_idempotency_key_reused_for_another_slot_is_rejected() {
    let engine = setup();
    let centrifuge = ResourceId::parse(CENTRIFUGE_ID).unwrap();

    // Arrange: alice が顕微鏡をキー "k1" で予約
    let mut first = request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0));
    first.idempotency_key = Some("k1".to_string());
    reservation::create_booking(&engine.deps, first).await.unwrap();

    // Act: 同じキーで別のリソース・日時を求める
    let mut other = request(&centrifuge, Actor::member("alice"), date(2025, 7, 15), "14:00", 3, at(2025, 5, 20, 1, 5));
    other.idempotency_key = Some("k1".to_string());
    let result = reservation::create_booking(&engine.deps, other).await;

    // Assert
    assert!(matches!(
        result,
        Err(ReservationError::Validation(BookingValidationError::IdempotencyKeyReused(ref key))) if key == "k1"
    ));
    assert_eq!(reservation::list_all_bookings(&engine.deps).await.unwrap().len(), 1);

    // 別の申請者なら同じキーでも独立
    let mut bob = request(&centrifuge, Actor::member("bob"), date(2025, 7, 15), "14:00", 3, at(2025, 5, 20, 1, 6));
    bob.idempotency_key = Some("k1".to_string());
    assert!(reservation::create_booking(&engine.deps, bob).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reuse_of_a_key_across_resources_stores_one_booking() {
    let engine = setup();
    let deps = Arc::new(engine.deps.clone());

    // 別リソースなのでロックは別々。キーの一意性はストアが守る
    let tasks: Vec<_> = [MICROSCOPE_ID, CENTRIFUGE_ID]
        .iter()
        .map(|id| {
            let deps = deps.clone();
            let mut cmd = request(
                &ResourceId::parse(id).unwrap(),
                Actor::member("alice"),
                date(2025, 6, 1),
                "09:00",
                2,
                at(2025, 5, 20, 1, 0),
            );
            cmd.idempotency_key = Some("same-key".to_string());
            tokio::spawn(async move { reservation::create_booking(&deps, cmd).await })
        })
        .collect();

    let mut created = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(ReservationError::Validation(BookingValidationError::IdempotencyKeyReused(_))) => {
                rejected += 1
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!((created, rejected), (1, 1));
    assert_eq!(reservation::list_all_bookings(&deps).await.unwrap().len(), 1);
}

// ============================================================================
// 異常系: 障害
// ============================================================================

#[tokio::test]
async fn test_audit_failure_leaves_booking_unchanged() {
    let engine = setup();
    let deps = &engine.deps;
    let now = at(2025, 5, 20, 1, 0);

    let booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, now),
    )
    .await
    .unwrap();
    reservation::confirm_booking(deps, booking.id, admin(), None, now)
        .await
        .unwrap();

    // Arrange: ログの書き込みを失敗させる
    engine.store.fail_audit_writes(true);

    // Act
    let result = reservation::confirm_return(
        deps,
        ConfirmReturn {
            booking_id: booking.id,
            actor: admin(),
            note: None,
            returned_at: now,
        },
    )
    .await;

    // Assert
    assert!(matches!(result, Err(ReservationError::AuditWriteFailure(_))));
    engine.store.fail_audit_writes(false);
    let current = reservation::get_booking(deps, booking.id).await.unwrap();
    assert_eq!(current.status, BookingStatus::Confirmed);
    let logs = reservation::query_audit_log(deps, AuditQuery::default(), None)
        .await
        .unwrap();
    assert_eq!(logs.len(), 2);
}

#[tokio::test]
async fn test_audit_failure_prevents_booking_creation() {
    let engine = setup();
    engine.store.fail_audit_writes(true);

    let result = reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0)),
    )
    .await;

    assert!(matches!(result, Err(ReservationError::AuditWriteFailure(_))));
    engine.store.fail_audit_writes(false);
    assert!(reservation::list_all_bookings(&engine.deps).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unavailable_store_is_retryable() {
    let engine = setup();
    engine.store.set_unavailable(true);

    let result = reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0)),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, ReservationError::StoreUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_times_out_and_retry_books_once() {
    let engine = memory_engine(EngineSettings {
        store_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    });
    engine
        .catalog
        .add_resource(equipment(MICROSCOPE_ID, "Confocal Microscope"));
    let cmd = request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 2, at(2025, 5, 20, 1, 0));

    // Arrange: ストアの応答をタイムアウトより遅くする
    engine.store.set_latency(Duration::from_millis(200));

    // Act
    let err = reservation::create_booking(&engine.deps, cmd.clone())
        .await
        .unwrap_err();

    // Assert
    assert!(matches!(err, ReservationError::Timeout { .. }));
    assert!(err.is_retryable());

    // 回復後の再送は1件だけ予約を作る
    engine.store.set_latency(Duration::ZERO);
    let first = reservation::create_booking(&engine.deps, cmd.clone()).await.unwrap();
    let again = reservation::create_booking(&engine.deps, cmd).await.unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(reservation::list_all_bookings(&engine.deps).await.unwrap().len(), 1);
}

// ============================================================================
// QRスキャン
// ============================================================================

#[tokio::test]
async fn test_scan_resolution_is_served_from_cache() {
    let engine = setup();
    let payload = format!("https://lab.example.org/equipment/{}?src=qr", MICROSCOPE_ID);

    let first = reservation::resolve_scan(&engine.deps, &payload).await.unwrap();
    let second = reservation::resolve_scan(&engine.deps, MICROSCOPE_ID).await.unwrap();

    assert_eq!(first.id, microscope());
    assert_eq!(second.display_name, "Confocal Microscope");
    assert_eq!(engine.catalog.lookup_count(), 1);

    // カタログが落ちてもキャッシュ済みのリソースは解決できる
    engine.catalog.set_unavailable(true);
    assert!(reservation::resolve_scan(&engine.deps, MICROSCOPE_ID).await.is_ok());
    let err = reservation::resolve_scan(&engine.deps, CENTRIFUGE_ID)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_scan_errors() {
    let engine = setup();

    let garbage = reservation::resolve_scan(&engine.deps, "not a resource label").await;
    assert!(matches!(garbage, Err(ReservationError::ScanDecode(_))));

    let unknown = reservation::resolve_scan(&engine.deps, r#"{"id": "bbbbbbbbbbbbbbbbbbbbbbbb"}"#).await;
    assert!(matches!(unknown, Err(ReservationError::ResourceNotFound(_))));
}

#[tokio::test]
async fn test_primed_cache_resolves_without_lookups() {
    let engine = setup();

    let primed = reservation::prime_resource_cache(&engine.deps, Some(ResourceKind::Equipment))
        .await
        .unwrap();
    reservation::resolve_scan(&engine.deps, CENTRIFUGE_ID)
        .await
        .unwrap();

    assert_eq!(primed, 2);
    assert_eq!(engine.deps.resource_cache.len(), 2);
    assert_eq!(engine.catalog.lookup_count(), 0);
}

#[tokio::test]
async fn test_return_candidates_are_oldest_first_and_active_only() {
    let engine = setup();
    let deps = &engine.deps;
    let now = at(2025, 5, 20, 1, 0);

    let later = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 9), "09:00", 1, now),
    )
    .await
    .unwrap();
    let earlier = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("bob"), date(2025, 6, 2), "15:00", 1, now),
    )
    .await
    .unwrap();
    let dropped = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("carol"), date(2025, 6, 4), "10:00", 1, now),
    )
    .await
    .unwrap();
    reservation::cancel_booking(deps, dropped.id, Actor::member("carol"), None, now)
        .await
        .unwrap();

    let candidates = reservation::scan_for_return(deps, MICROSCOPE_ID).await.unwrap();

    let ids: Vec<_> = candidates.bookings.iter().map(|b| b.id).collect();
    assert_eq!(ids, vec![earlier.id, later.id]);
}

// ============================================================================
// 監査ログ
// ============================================================================

#[tokio::test]
async fn test_audit_log_filters_and_limit() {
    let engine = setup();
    let deps = &engine.deps;
    let now = at(2025, 5, 20, 1, 0);
    let room = ResourceId::parse(SEMINAR_ROOM_ID).unwrap();

    let equipment_booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 1, now),
    )
    .await
    .unwrap();
    reservation::create_booking(
        deps,
        request(&room, Actor::member("bob"), date(2025, 6, 1), "09:00", 1, now),
    )
    .await
    .unwrap();
    reservation::confirm_booking(deps, equipment_booking.id, admin(), None, at(2025, 5, 20, 2, 0))
        .await
        .unwrap();

    let venues = reservation::query_audit_log(
        deps,
        AuditQuery {
            resource_kind: Some(ResourceKind::Venue),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(venues.len(), 1);
    assert_eq!(venues[0].requester_id.as_str(), "bob");

    let recent = reservation::query_audit_log(
        deps,
        AuditQuery {
            since: Some(at(2025, 5, 20, 1, 30)),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].action, LifecycleAction::Confirm);

    let limited = reservation::query_audit_log(deps, AuditQuery::default(), Some(2))
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].action, LifecycleAction::Confirm);

    let at_least_one = reservation::query_audit_log(deps, AuditQuery::default(), Some(0))
        .await
        .unwrap();
    assert_eq!(at_least_one.len(), 1);
}

#[tokio::test]
async fn test_export_streams_every_entry_oldest_first() {
    let engine = setup();
    let deps = &engine.deps;
    let now = at(2025, 5, 20, 1, 0);

    let booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 1, now),
    )
    .await
    .unwrap();
    reservation::confirm_booking(deps, booking.id, admin(), None, at(2025, 5, 20, 2, 0))
        .await
        .unwrap();

    let entries: Vec<_> = reservation::export_audit_log(deps)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, LifecycleAction::Create);
    assert_eq!(entries[0].previous_status, None);
    assert_eq!(entries[1].action, LifecycleAction::Confirm);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_export_times_out() {
    let engine = memory_engine(EngineSettings {
        store_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    });
    engine
        .catalog
        .add_resource(equipment(MICROSCOPE_ID, "Confocal Microscope"));
    reservation::create_booking(
        &engine.deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 1, at(2025, 5, 20, 1, 0)),
    )
    .await
    .unwrap();

    // Arrange: エントリの読み出しをタイムアウトより遅くする
    engine.store.set_latency(Duration::from_millis(200));

    // Act
    let results: Vec<_> = reservation::export_audit_log(&engine.deps).collect().await;

    // Assert: タイムアウトを1件流して終わる
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        Err(ReservationError::Timeout { operation: "export audit log" })
    ));
}

#[tokio::test]
async fn test_append_failure_is_reported() {
    let engine = setup();
    let deps = &engine.deps;
    let booking = reservation::create_booking(
        deps,
        request(&microscope(), Actor::member("alice"), date(2025, 6, 1), "09:00", 1, at(2025, 5, 20, 1, 0)),
    )
    .await
    .unwrap();
    let mut entry = reservation::query_audit_log(deps, AuditQuery::default(), None)
        .await
        .unwrap()
        .remove(0);
    entry.id = rusty_lab_reservation::domain::LogEntryId::new();
    entry.note = Some("label reprinted".to_string());

    engine.store.fail_audit_writes(true);
    let result = reservation::append_log_entry(deps, entry.clone()).await;
    assert!(matches!(result, Err(ReservationError::AuditWriteFailure(_))));

    engine.store.fail_audit_writes(false);
    let id = reservation::append_log_entry(deps, entry).await.unwrap();
    let logs = reservation::query_audit_log(
        deps,
        AuditQuery {
            booking_id: Some(booking.id),
            ..Default::default()
        },
        None,
    )
    .await
    .unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().any(|e| e.id == id));
}
