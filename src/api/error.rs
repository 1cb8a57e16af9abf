use crate::application::reservation::ReservationError;
use crate::domain::BookingValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// 一時障害のときにクライアントへ返す共通メッセージ
const TRY_AGAIN_MESSAGE: &str = "The service is temporarily unavailable, please try again";

/// API層のエラー型
///
/// アプリケーション層のエラーと、リクエストの前提（操作者ヘッダー・クエリ）のエラーを
/// HTTPレスポンスにマッピングする。
#[derive(Debug)]
pub enum ApiError {
    Reservation(ReservationError),
    /// 操作者ヘッダーがない・読めない
    Unauthenticated(String),
    /// 管理者専用の操作
    AdminOnly,
    /// クエリパラメータが不正
    BadRequest(String),
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        ApiError::Reservation(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Reservation(err) => err,
            // 401 Unauthorized - 操作者が特定できない
            ApiError::Unauthenticated(msg) => {
                return error_response(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg);
            }
            // 403 Forbidden - 管理者専用
            ApiError::AdminOnly => {
                return error_response(
                    StatusCode::FORBIDDEN,
                    "ADMIN_ONLY",
                    "This operation requires an admin",
                );
            }
            // 400 Bad Request - クエリパラメータ
            ApiError::BadRequest(msg) => {
                return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg);
            }
        };

        match err {
            // 422 Unprocessable Entity - 同じ冪等キーで別の内容
            ReservationError::Validation(e @ BookingValidationError::IdempotencyKeyReused(_)) => {
                error_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "IDEMPOTENCY_KEY_REUSED",
                    e.to_string(),
                )
            }
            // 400 Bad Request - 入力を直せば通る
            ReservationError::Validation(e) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            ReservationError::ScanDecode(_) => error_response(
                StatusCode::BAD_REQUEST,
                "SCAN_DECODE_ERROR",
                "No resource id found in the scanned code, rescan or pick the resource manually",
            ),

            // 403 Forbidden - 操作者に権限がない
            ReservationError::NotPermitted(e) => {
                error_response(StatusCode::FORBIDDEN, "NOT_PERMITTED", e.to_string())
            }

            // 404 Not Found
            ReservationError::ResourceNotFound(id) => error_response(
                StatusCode::NOT_FOUND,
                "RESOURCE_NOT_FOUND",
                format!("Resource {id} not found"),
            ),
            ReservationError::BookingNotFound(id) => error_response(
                StatusCode::NOT_FOUND,
                "BOOKING_NOT_FOUND",
                format!("Booking {id} not found"),
            ),

            // 409 Conflict - 既存予約と重なる
            ReservationError::SlotConflict { existing } => {
                let mut body = ErrorResponse::new(
                    "SLOT_CONFLICT",
                    "The requested time overlaps an existing booking, choose another slot",
                );
                body.conflicting_booking_id = Some(existing.value());
                (StatusCode::CONFLICT, Json(body)).into_response()
            }

            // 422 Unprocessable Entity - ビジネスルール違反
            ReservationError::ResourceUnavailable { resource_id, status } => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "RESOURCE_UNAVAILABLE",
                format!("Resource {resource_id} is {status} and cannot be booked"),
            ),
            ReservationError::InvalidTransition(e) => {
                tracing::warn!("Rejected booking transition: {}", e);
                error_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INVALID_TRANSITION",
                    "The booking cannot be changed from its current status",
                )
            }

            // 503 Service Unavailable - 一時障害（再送してよい）
            ReservationError::StoreUnavailable(ref e) => {
                tracing::warn!("Store unavailable: {}", e);
                error_response(StatusCode::SERVICE_UNAVAILABLE, "TRY_AGAIN", TRY_AGAIN_MESSAGE)
            }
            ReservationError::Timeout { operation } => {
                tracing::warn!("Timed out while trying to {}", operation);
                error_response(StatusCode::SERVICE_UNAVAILABLE, "TRY_AGAIN", TRY_AGAIN_MESSAGE)
            }

            // 500 Internal Server Error - システム障害
            // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
            ReservationError::AuditWriteFailure(ref e) => {
                tracing::error!("Audit log write failed: {}", e);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "AUDIT_WRITE_FAILURE",
                    "The change was not applied",
                )
            }
            ReservationError::Corrupted(ref msg) => {
                tracing::error!("Stored data is corrupted: {}", msg);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An unexpected error occurred",
                )
            }
        }
    }
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(error, message))).into_response()
}
