use crate::domain::{OperationalStatus, Resource, ResourceId, ResourceKind};
use crate::ports::resource_catalog::{ResourceCatalog as ResourceCatalogTrait, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Mock implementation of ResourceCatalog
///
/// Supports stateful testing by storing resources in memory.
/// Resources can be added and their operational status changed at any time.
/// Counts remote lookups so tests can verify cache hits.
#[derive(Default)]
pub struct ResourceCatalog {
    resources: Mutex<HashMap<ResourceId, Resource>>,
    lookups: AtomicUsize,
    unavailable: AtomicBool,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog pre-filled with the given resources
    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let catalog = Self::new();
        for resource in resources {
            catalog.add_resource(resource);
        }
        catalog
    }

    /// Add or replace a resource
    pub fn add_resource(&self, resource: Resource) {
        self.resources().insert(resource.id.clone(), resource);
    }

    /// Change the operational status of a resource
    pub fn set_status(&self, id: &ResourceId, status: OperationalStatus) {
        if let Some(resource) = self.resources().get_mut(id) {
            resource.operational_status = status;
        }
    }

    /// Make every lookup fail as if the remote catalog were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get_resource` calls served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn resources(&self) -> MutexGuard<'_, HashMap<ResourceId, Resource>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("resource catalog is unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceCatalogTrait for ResourceCatalog {
    /// Look up a resource by id
    async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.resources().get(id).cloned())
    }

    /// List resources filtered by kind and category, sorted by display name
    async fn list_by_category(
        &self,
        kind: Option<ResourceKind>,
        category: Option<&str>,
    ) -> Result<Vec<Resource>> {
        self.check_available()?;
        let mut found: Vec<Resource> = self
            .resources()
            .values()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .filter(|r| category.is_none_or(|c| r.category == c))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str, kind: ResourceKind, category: &str, name: &str) -> Resource {
        Resource {
            id: ResourceId::parse(id).unwrap(),
            kind,
            category: category.to_string(),
            display_name: name.to_string(),
            operational_status: OperationalStatus::Available,
            hourly_rate: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn test_list_by_category_filters_and_sorts() {
        let catalog = ResourceCatalog::with_resources([
            resource("000000000000000000000001", ResourceKind::Equipment, "microscope", "Zeiss"),
            resource("000000000000000000000002", ResourceKind::Equipment, "microscope", "Leica"),
            resource("000000000000000000000003", ResourceKind::Equipment, "centrifuge", "Eppendorf"),
            resource("000000000000000000000004", ResourceKind::Venue, "seminar", "Room 101"),
        ]);

        let scopes = catalog
            .list_by_category(Some(ResourceKind::Equipment), Some("microscope"))
            .await
            .unwrap();
        let names: Vec<_> = scopes.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["Leica", "Zeiss"]);

        let all = catalog.list_by_category(None, None).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_set_status_and_lookup_count() {
        let id = ResourceId::parse("000000000000000000000001").unwrap();
        let catalog = ResourceCatalog::with_resources([resource(
            id.as_str(),
            ResourceKind::Equipment,
            "microscope",
            "Zeiss",
        )]);

        catalog.set_status(&id, OperationalStatus::Maintenance);
        let found = catalog.get_resource(&id).await.unwrap().unwrap();
        assert_eq!(found.operational_status, OperationalStatus::Maintenance);
        assert_eq!(catalog.lookup_count(), 1);
    }
}
