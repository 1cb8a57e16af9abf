use crate::domain::{Resource, ResourceId, ResourceKind};
use crate::ports::resource_catalog::{ResourceCatalog as ResourceCatalogTrait, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::rows::map_row_to_resource;

const RESOURCE_COLUMNS: &str =
    "id, kind, category, display_name, operational_status, hourly_rate, location";

/// ResourceCatalogのPostgreSQL実装
///
/// resourcesテーブルを読み取り専用で参照する。
pub struct ResourceCatalog {
    pool: PgPool,
}

impl ResourceCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceCatalogTrait for ResourceCatalog {
    async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(map_row_to_resource).transpose()?)
    }

    async fn list_by_category(
        &self,
        kind: Option<ResourceKind>,
        category: Option<&str>,
    ) -> Result<Vec<Resource>> {
        let sql = format!(
            r#"
            SELECT {RESOURCE_COLUMNS}
            FROM resources
            WHERE ($1::varchar IS NULL OR kind = $1)
              AND ($2::varchar IS NULL OR category = $2)
            ORDER BY display_name ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(kind.map(|k| k.as_str()))
            .bind(category)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(map_row_to_resource)
            .collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
