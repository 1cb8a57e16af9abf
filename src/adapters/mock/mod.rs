pub mod resource_catalog;

pub use resource_catalog::ResourceCatalog as MockResourceCatalog;
