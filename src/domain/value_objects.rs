use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BookingValidationError;

/// リソースIDの形式（24桁の16進数）
static RESOURCE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("valid resource id pattern"));

/// 開始時刻の形式（HH:MM、先頭の0は省略可）
static START_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9])$").expect("valid start time pattern")
});

/// 民間暦の日付（タイムゾーンを持たない年月日）
///
/// 予約日は常にこの型で扱い、タイムスタンプから再構築しない。
pub type CivilDate = chrono::NaiveDate;

/// リソースID - 機材・会場カタログへの参照
///
/// 24桁の16進数。生成時に検証し、小文字に正規化する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// 文字列を検証してリソースIDを作成する
    ///
    /// # エラー
    /// 24桁の16進数でない場合は`BookingValidationError::MalformedResourceId`を返す
    pub fn parse(raw: &str) -> Result<Self, BookingValidationError> {
        if !Self::is_well_formed(raw) {
            return Err(BookingValidationError::MalformedResourceId(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// 24桁の16進数か判定する
    pub fn is_well_formed(raw: &str) -> bool {
        RESOURCE_ID_PATTERN.is_match(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = BookingValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 予約ID - 予約管理コンテキストの集約ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 監査ログエントリID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEntryId(Uuid);

impl LogEntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LogEntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// 利用者ID - 会員管理コンテキストへの参照
///
/// 会員管理側のIDは文字列なので、そのまま保持する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// リソース種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Equipment,
    Venue,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Equipment => "equipment",
            ResourceKind::Venue => "venue",
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equipment" => Ok(ResourceKind::Equipment),
            "venue" => Ok(ResourceKind::Venue),
            _ => Err(format!("Invalid resource kind: {}", s)),
        }
    }
}

/// 操作者のロール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// 一般利用者（予約の申請者）
    Member,
    /// ラボ管理者
    Admin,
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(ActorRole::Member),
            "admin" => Ok(ActorRole::Admin),
            _ => Err(format!("Invalid actor role: {}", s)),
        }
    }
}

/// リクエスト単位の操作者情報
///
/// 認証ミドルウェアが構築し、すべての変更系呼び出しに明示的に渡される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn member(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: UserId::new(actor_id),
            role: ActorRole::Member,
        }
    }

    pub fn admin(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: UserId::new(actor_id),
            role: ActorRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// 予約時間（時間単位）
///
/// 不変条件：1時間以上24時間以下
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DurationHours(u8);

impl DurationHours {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 24;

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn minutes(&self) -> u32 {
        u32::from(self.0) * 60
    }
}

impl TryFrom<u8> for DurationHours {
    type Error = BookingValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(BookingValidationError::DurationOutOfRange(i64::from(value)));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i64> for DurationHours {
    type Error = BookingValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| BookingValidationError::DurationOutOfRange(value))
            .and_then(Self::try_from)
    }
}

impl From<DurationHours> for u8 {
    fn from(d: DurationHours) -> Self {
        d.0
    }
}

/// 開始時刻（民間時刻、分単位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StartTime(u16);

impl StartTime {
    /// "HH:MM"形式の文字列を解析する
    pub fn parse(raw: &str) -> Result<Self, BookingValidationError> {
        let caps = START_TIME_PATTERN
            .captures(raw.trim())
            .ok_or_else(|| BookingValidationError::MalformedStartTime(raw.to_string()))?;
        let hour: u16 = caps[1]
            .parse()
            .map_err(|_| BookingValidationError::MalformedStartTime(raw.to_string()))?;
        let minute: u16 = caps[2]
            .parse()
            .map_err(|_| BookingValidationError::MalformedStartTime(raw.to_string()))?;
        Ok(Self(hour * 60 + minute))
    }

    /// 0時からの経過分で作成する
    pub fn from_minutes(minutes: u16) -> Result<Self, BookingValidationError> {
        if minutes >= 24 * 60 {
            return Err(BookingValidationError::MalformedStartTime(format!(
                "{} minutes past midnight",
                minutes
            )));
        }
        Ok(Self(minutes))
    }

    pub fn minutes_since_midnight(&self) -> u16 {
        self.0
    }

    pub fn hour(&self) -> u16 {
        self.0 / 60
    }

    pub fn minute(&self) -> u16 {
        self.0 % 60
    }
}

impl TryFrom<String> for StartTime {
    type Error = BookingValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StartTime> for String {
    fn from(t: StartTime) -> Self {
        t.to_string()
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// 予約が占有する時間帯（半開区間 [start, end)、分単位）
///
/// 24時を越える予約もあるため、終端は1440を超えうる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

impl TimeWindow {
    pub fn new(start: StartTime, duration: DurationHours) -> Self {
        let start = u32::from(start.minutes_since_midnight());
        Self {
            start,
            end: start + duration.minutes(),
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// 時間帯が重なるか（境界が接するだけなら重ならない）
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_accepts_24_hex_and_lowercases() {
        let id = ResourceId::parse("507F1F77BCF86CD799439011").unwrap();
        assert_eq!(id.as_str(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_resource_id_rejects_wrong_length_and_non_hex() {
        assert!(ResourceId::parse("507f1f77bcf86cd79943901").is_err());
        assert!(ResourceId::parse("507f1f77bcf86cd7994390111").is_err());
        assert!(ResourceId::parse("507f1f77bcf86cd79943901z").is_err());
        assert!(ResourceId::parse("").is_err());
    }

    #[test]
    fn test_resource_id_deserialize_validates() {
        let ok: Result<ResourceId, _> = serde_json::from_str("\"507f1f77bcf86cd799439011\"");
        assert!(ok.is_ok());
        let bad: Result<ResourceId, _> = serde_json::from_str("\"not-an-id\"");
        assert!(bad.is_err());
    }

    // TDD: DurationHours のテスト
    #[test]
    fn test_duration_bounds() {
        assert!(DurationHours::try_from(0u8).is_err());
        assert_eq!(DurationHours::try_from(1u8).unwrap().value(), 1);
        assert_eq!(DurationHours::try_from(24u8).unwrap().value(), 24);
        assert_eq!(
            DurationHours::try_from(25u8).unwrap_err(),
            BookingValidationError::DurationOutOfRange(25)
        );
        assert_eq!(
            DurationHours::try_from(-3i64).unwrap_err(),
            BookingValidationError::DurationOutOfRange(-3)
        );
    }

    #[test]
    fn test_start_time_parse_and_display() {
        let t = StartTime::parse("9:05").unwrap();
        assert_eq!(t.minutes_since_midnight(), 9 * 60 + 5);
        assert_eq!(t.to_string(), "09:05");
        assert_eq!(StartTime::parse("23:59").unwrap().to_string(), "23:59");
        assert!(StartTime::parse("24:00").is_err());
        assert!(StartTime::parse("12:60").is_err());
        assert!(StartTime::parse("noon").is_err());
    }

    #[test]
    fn test_time_window_half_open_overlap() {
        let two_hours = DurationHours::try_from(2u8).unwrap();
        let one_hour = DurationHours::try_from(1u8).unwrap();
        let nine_to_eleven = TimeWindow::new(StartTime::parse("09:00").unwrap(), two_hours);
        let ten_to_eleven = TimeWindow::new(StartTime::parse("10:00").unwrap(), one_hour);
        let eleven_to_noon = TimeWindow::new(StartTime::parse("11:00").unwrap(), one_hour);
        let eight_to_nine = TimeWindow::new(StartTime::parse("08:00").unwrap(), one_hour);

        assert!(nine_to_eleven.overlaps(&ten_to_eleven));
        assert!(ten_to_eleven.overlaps(&nine_to_eleven));
        // 境界が接するだけなら重複しない
        assert!(!nine_to_eleven.overlaps(&eleven_to_noon));
        assert!(!nine_to_eleven.overlaps(&eight_to_nine));
    }

    #[test]
    fn test_booking_id_creation() {
        let id1 = BookingId::new();
        let id2 = BookingId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_actor_role_from_str() {
        assert_eq!("ADMIN".parse::<ActorRole>().unwrap(), ActorRole::Admin);
        assert_eq!("member".parse::<ActorRole>().unwrap(), ActorRole::Member);
        assert!("root".parse::<ActorRole>().is_err());
    }
}
