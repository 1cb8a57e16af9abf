mod audit_logger;
mod availability;
mod conflict;
mod dependencies;
mod errors;
mod lifecycle;
mod resource_locks;
mod return_workflow;
mod scan_resolver;
mod scan_session;

pub use audit_logger::{
    DEFAULT_AUDIT_LIMIT, MAX_AUDIT_LIMIT, append_log_entry, export_audit_log, query_audit_log,
};
pub use availability::{availability, bookings_on};
pub use conflict::{ConflictCheck, check_conflict};
pub use dependencies::{DEFAULT_LAB_OFFSET_SECS, EngineSettings, ServiceDependencies};
pub use errors::{ReservationError, Result};
pub use lifecycle::{
    cancel_booking, confirm_booking, create_booking, get_booking, list_all_bookings,
    list_bookings_for_requester, transition_booking,
};
pub use resource_locks::ResourceLocks;
pub use return_workflow::{
    ReturnCandidates, SCAN_RETURN_NOTE, active_bookings_for, confirm_return,
    confirm_scanned_return, scan_for_return,
};
pub use scan_resolver::{ResourceCache, list_resources, prime_resource_cache, resolve_scan};
pub use scan_session::ScanSession;
