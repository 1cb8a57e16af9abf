use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::ResourceId;

/// 保持するロックがこの数を超えたら未使用のものを掃除する
const PRUNE_THRESHOLD: usize = 1024;

/// リソース単位の直列化ポイント
///
/// 同じリソースへの予約作成は1件ずつ処理し、異なるリソースは並行に進める。
/// グローバルロックは持たない（マップ操作の間だけ短く保持する）。
#[derive(Default)]
pub struct ResourceLocks {
    slots: Mutex<HashMap<ResourceId, Arc<AsyncMutex<()>>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// リソースのロックを取得する
    ///
    /// 返されたガードを破棄するまで、同じリソースの他の呼び出しは待機する。
    pub async fn lock(&self, resource_id: &ResourceId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() > PRUNE_THRESHOLD {
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(resource_id.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }
}
