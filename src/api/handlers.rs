use crate::application::reservation::{
    self as reservation, ServiceDependencies, cancel_booking as execute_cancel_booking,
    confirm_booking as execute_confirm_booking, create_booking as execute_create_booking,
};
use crate::domain::{BookingId, ResourceId, ResourceKind, commands::ConfirmReturn};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    auth::{AdminActor, CurrentActor},
    error::ApiError,
    types::{
        AuditLogQuery, AvailabilityQuery, AvailabilityResponse, BookingResponse,
        CreateBookingRequest, ListResourcesQuery, ResourceResponse, ReturnCandidatesResponse,
        ScanRequest, TransitionRequest,
    },
};
use crate::domain::BookingLogEntry;

/// 再送検出に使うリクエストヘッダー
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// エクスポート中に送信待ちにできる行数
const EXPORT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

fn parse_resource_id(raw: &str) -> Result<ResourceId, ApiError> {
    ResourceId::parse(raw).map_err(|e| ApiError::Reservation(e.into()))
}

fn note_of(body: Option<Json<TransitionRequest>>) -> Option<String> {
    body.and_then(|Json(req)| req.note)
}

// ============================================================================
// Command handlers (POST)
// ============================================================================

/// POST /bookings - 新しい予約を作成
///
/// 強制されるビジネスルール:
/// - 予約日がラボの暦で今日以降であること
/// - 予約時間が1〜24時間であること
/// - リソースが予約を受け付ける状態であること
/// - 同じ日付の占有中の予約と時間帯が重ならないこと
///
/// `Idempotency-Key`ヘッダーがあれば、同じキーでの再送は既存の予約を返す。
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let cmd = req
        .to_command(actor, idempotency_key, Utc::now())
        .map_err(|e| ApiError::Reservation(e.into()))?;

    let booking = execute_create_booking(&state.service_deps, cmd).await?;

    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

/// POST /bookings/:id/confirm - 予約を承認（管理者のみ）
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = execute_confirm_booking(
        &state.service_deps,
        BookingId::from_uuid(booking_id),
        actor,
        note_of(body),
        Utc::now(),
    )
    .await?;

    Ok(Json(BookingResponse::from(booking)))
}

/// POST /bookings/:id/cancel - 予約を取消
///
/// pending は申請者本人または管理者、confirmed は管理者のみ取消できる。
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking = execute_cancel_booking(
        &state.service_deps,
        BookingId::from_uuid(booking_id),
        actor,
        note_of(body),
        Utc::now(),
    )
    .await?;

    Ok(Json(BookingResponse::from(booking)))
}

/// POST /bookings/:id/return - 返却を確定（管理者のみ、手動）
///
/// confirmed の予約だけが返却できる。
pub async fn return_booking(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let cmd = ConfirmReturn {
        booking_id: BookingId::from_uuid(booking_id),
        actor,
        note: note_of(body),
        returned_at: Utc::now(),
    };
    let booking = reservation::confirm_return(&state.service_deps, cmd).await?;

    Ok(Json(BookingResponse::from(booking)))
}

/// POST /scans/resolve - スキャンしたQRペイロードをリソースに解決
pub async fn resolve_scan(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ResourceResponse>, ApiError> {
    let resource = reservation::resolve_scan(&state.service_deps, &req.payload).await?;
    Ok(Json(ResourceResponse::from(resource)))
}

/// POST /scans/return - スキャンしたリソースの返却候補を取得（管理者のみ）
pub async fn scan_return_candidates(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Json(req): Json<ScanRequest>,
) -> Result<Json<ReturnCandidatesResponse>, ApiError> {
    let candidates = reservation::scan_for_return(&state.service_deps, &req.payload).await?;
    Ok(Json(ReturnCandidatesResponse::from(candidates)))
}

/// POST /scans/return/:booking_id - スキャン経由で返却を確定（管理者のみ）
pub async fn scan_return_confirm(
    State(state): State<Arc<AppState>>,
    AdminActor(actor): AdminActor,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let cmd = ConfirmReturn {
        booking_id: BookingId::from_uuid(booking_id),
        actor,
        note: note_of(body),
        returned_at: Utc::now(),
    };
    let booking = reservation::confirm_scanned_return(&state.service_deps, cmd).await?;

    Ok(Json(BookingResponse::from(booking)))
}

// ============================================================================
// Query handlers (GET)
// ============================================================================

/// GET /resources - リソース一覧（種別・カテゴリで絞り込み）
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
    Query(query): Query<ListResourcesQuery>,
) -> Result<Json<Vec<ResourceResponse>>, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<ResourceKind>)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let resources =
        reservation::list_resources(&state.service_deps, kind, query.category.as_deref()).await?;

    Ok(Json(resources.into_iter().map(ResourceResponse::from).collect()))
}

/// GET /resources/:id/availability?year=&month= - 月内の予約済み日付
pub async fn availability(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
    Path(resource_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let resource_id = parse_resource_id(&resource_id)?;
    let booked =
        reservation::availability(&state.service_deps, &resource_id, query.year, query.month)
            .await?;

    Ok(Json(AvailabilityResponse {
        resource_id: resource_id.to_string(),
        year: query.year,
        month: query.month,
        booked_dates: booked.into_iter().collect(),
    }))
}

/// GET /resources/:id/availability/:date - 指定日の予約一覧
pub async fn bookings_on(
    State(state): State<Arc<AppState>>,
    CurrentActor(_actor): CurrentActor,
    Path((resource_id, date)): Path<(String, NaiveDate)>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let resource_id = parse_resource_id(&resource_id)?;
    let bookings = reservation::bookings_on(&state.service_deps, &resource_id, date).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// GET /resources/:id/active-bookings - 占有中の予約（古い順、管理者のみ）
pub async fn active_bookings(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Path(resource_id): Path<String>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let resource_id = parse_resource_id(&resource_id)?;
    let bookings = reservation::active_bookings_for(&state.service_deps, &resource_id).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// GET /bookings - 全予約（管理者のみ）
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let bookings = reservation::list_all_bookings(&state.service_deps).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// GET /bookings/mine - 自分の予約
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let bookings =
        reservation::list_bookings_for_requester(&state.service_deps, &actor.actor_id).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

/// GET /bookings/:id - 予約詳細
///
/// 申請者本人と管理者のみ参照できる。他人の予約は存在しないものとして扱う。
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let booking_id = BookingId::from_uuid(booking_id);
    let booking = reservation::get_booking(&state.service_deps, booking_id).await?;

    if !actor.is_admin() && booking.requester_id != actor.actor_id {
        return Err(reservation::ReservationError::BookingNotFound(booking_id).into());
    }

    Ok(Json(BookingResponse::from(booking)))
}

/// GET /booking-logs - 監査ログ照会（管理者のみ）
///
/// クエリパラメータ:
/// - resource_kind: equipment / venue
/// - booking_id, resource_id, action, since: 任意の絞り込み
/// - limit: 既定100、最大500
pub async fn list_booking_logs(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<BookingLogEntry>>, ApiError> {
    let filter = query.to_filter().map_err(ApiError::BadRequest)?;
    let entries = reservation::query_audit_log(&state.service_deps, filter, query.limit).await?;
    Ok(Json(entries))
}

/// GET /booking-logs/export - 監査ログ全件をNDJSONで出力（管理者のみ）
///
/// エントリは読んだ順に1行ずつ送る。最初の1件が読めなければエラーレスポンスを返し、
/// 途中で失敗した場合は本文を打ち切る。
pub async fn export_booking_logs(
    State(state): State<Arc<AppState>>,
    AdminActor(_actor): AdminActor,
) -> Result<Response, ApiError> {
    let (tx, mut rx) = mpsc::channel(EXPORT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut entries = reservation::export_audit_log(&state.service_deps);
        while let Some(entry) = entries.next().await {
            let line = entry.and_then(|entry| ndjson_line(&entry));
            let failed = line.is_err();
            if let Err(e) = &line {
                tracing::error!(error = %e, "Audit log export failed");
            }
            if tx.send(line).await.is_err() || failed {
                break;
            }
        }
    });

    let first = match rx.recv().await {
        Some(Err(e)) => return Err(e.into()),
        first => first,
    };
    let rest = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|line| (line, rx)) });
    let body = Body::from_stream(stream::iter(first).chain(rest));

    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}

fn ndjson_line(entry: &BookingLogEntry) -> Result<String, reservation::ReservationError> {
    let mut line = serde_json::to_string(entry)
        .map_err(|e| reservation::ReservationError::Corrupted(e.to_string()))?;
    line.push('\n');
    Ok(line)
}
