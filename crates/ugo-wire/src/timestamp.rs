//! UTC 毫秒时间戳工具

use std::time::{SystemTime, UNIX_EPOCH};

/// 当前 UTC 时间的毫秒数
///
/// 系统时钟早于 Unix 纪元时返回 0（仅在时钟严重异常时发生）。
pub fn utc_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
