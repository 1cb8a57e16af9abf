pub mod audit_log;
pub mod booking_store;
pub mod resource_catalog;
pub mod store_error;

pub use audit_log::*;
pub use booking_store::*;
pub use resource_catalog::ResourceCatalog;
pub use store_error::*;
