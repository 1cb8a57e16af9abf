use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::{Resource, ResourceId, ResourceKind, scan::decode_scan_payload};

use super::dependencies::{ServiceDependencies, bounded};
use super::errors::{ReservationError, Result};

/// スキャン用のリソースキャッシュ
///
/// 追加・更新のみで削除しない。同じIDは常に1件（後から来た情報で上書き）。
#[derive(Default)]
pub struct ResourceCache {
    entries: RwLock<HashMap<ResourceId, Resource>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ResourceId) -> Option<Resource> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// 追加または更新する（何度呼んでも結果は同じ）
    pub fn upsert(&self, resource: Resource) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.id.clone(), resource);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// QRペイロードをリソースに解決する
///
/// 1. ペイロードからリソースIDを取り出す（純粋関数）
/// 2. キャッシュにあればそれを返す
/// 3. なければカタログに問い合わせ、結果をキャッシュに入れる
///
/// # エラー
/// - ScanDecode: IDを取り出せない（再スキャンを促す）
/// - ResourceNotFound: IDは取れたがカタログにない
/// - StoreUnavailable / Timeout: カタログに届かない
#[tracing::instrument(skip(deps, raw_payload))]
pub async fn resolve_scan(deps: &ServiceDependencies, raw_payload: &str) -> Result<Resource> {
    let resource_id = decode_scan_payload(raw_payload)
        .inspect_err(|_| tracing::debug!("Scanned payload has no resource id"))?;

    if let Some(cached) = deps.resource_cache.get(&resource_id) {
        tracing::debug!(%resource_id, "Resolved scan from cache");
        return Ok(cached);
    }

    let fetched = bounded(
        deps.settings.lookup_timeout,
        "look up scanned resource",
        deps.resource_catalog.get_resource(&resource_id),
    )
    .await?
    .map_err(ReservationError::StoreUnavailable)?;

    match fetched {
        Some(resource) => {
            deps.resource_cache.upsert(resource.clone());
            tracing::debug!(%resource_id, "Resolved scan from catalog");
            Ok(resource)
        }
        None => Err(ReservationError::ResourceNotFound(resource_id)),
    }
}

/// カタログのリソースを一覧する
///
/// 取得したリソースはスキャン用キャッシュにも入れる。
pub async fn list_resources(
    deps: &ServiceDependencies,
    kind: Option<ResourceKind>,
    category: Option<&str>,
) -> Result<Vec<Resource>> {
    let resources = bounded(
        deps.settings.lookup_timeout,
        "list resources",
        deps.resource_catalog.list_by_category(kind, category),
    )
    .await?
    .map_err(ReservationError::StoreUnavailable)?;

    for resource in &resources {
        deps.resource_cache.upsert(resource.clone());
    }
    Ok(resources)
}

/// カタログの内容でキャッシュを温める
///
/// 戻り値はキャッシュに入れた件数。
pub async fn prime_resource_cache(
    deps: &ServiceDependencies,
    kind: Option<ResourceKind>,
) -> Result<usize> {
    let count = list_resources(deps, kind, None).await?.len();
    tracing::info!(count, "Resource cache primed");
    Ok(count)
}
