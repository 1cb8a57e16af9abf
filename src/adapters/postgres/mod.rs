pub mod audit_log;
pub mod booking_store;
pub mod resource_catalog;
mod rows;

// パブリックに型を再エクスポート
pub use audit_log::AuditLog as PostgresAuditLog;
pub use booking_store::BookingStore as PostgresBookingStore;
pub use resource_catalog::ResourceCatalog as PostgresResourceCatalog;
