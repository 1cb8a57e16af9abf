use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{ResourceId, ScanDecodeError};

/// テキスト中の24桁16進数
static EMBEDDED_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-fA-F]{24}").expect("valid embedded id pattern"));

/// 純粋関数：QRコードの生ペイロードからリソースIDを取り出す
///
/// 判定順（最初に一致したものを採用）：
/// 1. 前後の空白を除いた全体が24桁16進数
/// 2. JSONとして解析し、`_id.$oid` → `_id` → `id` → `equipmentId` の順に取り出す
/// 3. 生テキスト中で最初に現れる24桁16進数
///
/// どの経路でも取り出した値は`ResourceId::parse`で再検証する。
pub fn decode_scan_payload(raw: &str) -> Result<ResourceId, ScanDecodeError> {
    let trimmed = raw.trim();

    if let Ok(id) = ResourceId::parse(trimmed) {
        return Ok(id);
    }

    if let Some(id) = id_from_json(trimmed) {
        return Ok(id);
    }

    EMBEDDED_ID_PATTERN
        .find(raw)
        .and_then(|m| ResourceId::parse(m.as_str()).ok())
        .ok_or(ScanDecodeError)
}

/// JSONペイロードから候補フィールドを優先順に調べる
///
/// 候補が存在しても形式が不正なら次の候補を調べる。
fn id_from_json(payload: &str) -> Option<ResourceId> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let object = value.as_object()?;

    let candidates = [
        object
            .get("_id")
            .and_then(|id| id.get("$oid"))
            .and_then(Value::as_str),
        object.get("_id").and_then(Value::as_str),
        object.get("id").and_then(Value::as_str),
        object.get("equipmentId").and_then(Value::as_str),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|candidate| ResourceId::parse(candidate).ok())
}
