use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, active_bookings, availability, bookings_on, cancel_booking, confirm_booking,
    create_booking, export_booking_logs, get_booking, list_booking_logs, list_bookings,
    list_resources, my_bookings, resolve_scan, return_booking, scan_return_candidates,
    scan_return_confirm,
};

/// Creates the API router with all reservation endpoints
///
/// Command endpoints (Write operations):
/// - POST /bookings - Request a booking (optional Idempotency-Key header)
/// - POST /bookings/:id/confirm - Approve a pending booking (admin)
/// - POST /bookings/:id/cancel - Cancel a booking
/// - POST /bookings/:id/return - Close a confirmed booking (admin)
/// - POST /scans/resolve - Resolve a scanned QR payload
/// - POST /scans/return - Find return candidates for a scanned resource (admin)
/// - POST /scans/return/:booking_id - Close a booking found by scanning (admin)
///
/// Query endpoints (Read operations):
/// - GET /resources, /resources/:id/availability, /resources/:id/availability/:date
/// - GET /resources/:id/active-bookings (admin)
/// - GET /bookings (admin), /bookings/mine, /bookings/:id
/// - GET /booking-logs, /booking-logs/export (admin)
///
/// Every endpoint except /health expects the X-Actor-Id header
/// (and X-Actor-Role for admins) set by the upstream authentication layer.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Catalog and availability
        .route("/resources", get(list_resources))
        .route("/resources/:id/availability", get(availability))
        .route("/resources/:id/availability/:date", get(bookings_on))
        .route("/resources/:id/active-bookings", get(active_bookings))
        // Booking lifecycle
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/mine", get(my_bookings))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/confirm", post(confirm_booking))
        .route("/bookings/:id/cancel", post(cancel_booking))
        .route("/bookings/:id/return", post(return_booking))
        // QR scanning
        .route("/scans/resolve", post(resolve_scan))
        .route("/scans/return", post(scan_return_candidates))
        .route("/scans/return/:booking_id", post(scan_return_confirm))
        // Audit trail
        .route("/booking-logs", get(list_booking_logs))
        .route("/booking-logs/export", get(export_booking_logs))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
