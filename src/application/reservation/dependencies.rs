use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::domain::CivilDate;
use crate::ports::*;

use super::errors::{ReservationError, Result};
use super::resource_locks::ResourceLocks;
use super::scan_resolver::ResourceCache;

/// 既定のラボのUTCオフセット（+08:00）
pub const DEFAULT_LAB_OFFSET_SECS: i32 = 8 * 3600;

/// 予約エンジンの実行時設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// 予約ストア・監査ログ呼び出しの上限時間
    pub store_timeout: Duration,
    /// リソースカタログ呼び出しの上限時間
    pub lookup_timeout: Duration,
    /// 冪等キーなしの再送を同一リクエストとみなす時間
    pub dedupe_window: chrono::Duration,
    /// 「今日」を決めるラボのタイムゾーン
    pub lab_offset: FixedOffset,
}

impl EngineSettings {
    /// ラボの暦での今日の日付
    pub fn today(&self, at: DateTime<Utc>) -> CivilDate {
        at.with_timezone(&self.lab_offset).date_naive()
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            lookup_timeout: Duration::from_secs(3),
            dedupe_window: chrono::Duration::seconds(120),
            lab_offset: FixedOffset::east_opt(DEFAULT_LAB_OFFSET_SECS).unwrap_or(Utc.fix()),
        }
    }
}

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、ユースケース関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub booking_store: Arc<dyn BookingStore>,
    pub audit_log: Arc<dyn AuditLog>,
    pub resource_catalog: Arc<dyn ResourceCatalog>,
    pub resource_cache: Arc<ResourceCache>,
    pub resource_locks: Arc<ResourceLocks>,
    pub settings: EngineSettings,
}

impl ServiceDependencies {
    pub fn new(
        booking_store: Arc<dyn BookingStore>,
        audit_log: Arc<dyn AuditLog>,
        resource_catalog: Arc<dyn ResourceCatalog>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            booking_store,
            audit_log,
            resource_catalog,
            resource_cache: Arc::new(ResourceCache::new()),
            resource_locks: Arc::new(ResourceLocks::new()),
            settings,
        }
    }
}

/// 外部呼び出しを上限時間付きで待つ
///
/// 時間切れは`ReservationError::Timeout`。中の結果はそのまま返す。
pub(super) async fn bounded<F: Future>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<F::Output> {
    match tokio::time::timeout(limit, call).await {
        Ok(output) => Ok(output),
        Err(_) => {
            tracing::warn!(operation, ?limit, "Operation timed out");
            Err(ReservationError::Timeout { operation })
        }
    }
}
