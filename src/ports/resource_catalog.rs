use crate::domain::{Resource, ResourceId, ResourceKind};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// リソースカタログポート
///
/// 予約コンテキストとカタログ管理コンテキストの境界を維持する。
/// 予約コンテキストからは読み取りのみ。
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// IDでリソースを取得する
    ///
    /// 存在しない場合は`None`。
    async fn get_resource(&self, id: &ResourceId) -> Result<Option<Resource>>;

    /// 種別・カテゴリでリソースを一覧する
    ///
    /// `category`が`None`なら種別内のすべてを返す。
    async fn list_by_category(
        &self,
        kind: Option<ResourceKind>,
        category: Option<&str>,
    ) -> Result<Vec<Resource>>;
}
