use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DurationHours, ResourceId, ResourceKind};

/// リソースの稼働状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    Available,
    Maintenance,
    OutOfOrder,
}

impl OperationalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalStatus::Available => "available",
            OperationalStatus::Maintenance => "maintenance",
            OperationalStatus::OutOfOrder => "out_of_order",
        }
    }
}

impl std::fmt::Display for OperationalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(OperationalStatus::Available),
            "maintenance" => Ok(OperationalStatus::Maintenance),
            "out_of_order" => Ok(OperationalStatus::OutOfOrder),
            _ => Err(format!("Invalid operational status: {}", s)),
        }
    }
}

/// 予約可能なリソース（機材・会場）
///
/// カタログ管理コンテキストが所有する。予約コンテキストからは読み取り専用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub category: String,
    pub display_name: String,
    pub operational_status: OperationalStatus,
    /// 会場のみ
    pub hourly_rate: Option<Decimal>,
    pub location: Option<String>,
}

impl Resource {
    /// 新規予約を受け付けられるか
    pub fn accepts_bookings(&self) -> bool {
        self.operational_status == OperationalStatus::Available
    }

    /// 予約料金（会場のみ、時間単価 × 時間数）
    pub fn booking_cost(&self, duration: DurationHours) -> Option<Decimal> {
        match self.kind {
            ResourceKind::Venue => self
                .hourly_rate
                .map(|rate| rate * Decimal::from(duration.value())),
            ResourceKind::Equipment => None,
        }
    }
}
