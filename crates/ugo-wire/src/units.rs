//! 数值缩放与前缀解析
//!
//! 线上所有角度以 0.1 度为单位的整数传输，本模块集中定义
//! 双向换算，避免各处散落 `* 10.0` 魔法数。

/// 角度（度）编码为线上整数（0.1 度单位，四舍五入）
///
/// # 示例
///
/// ```rust
/// use ugo_wire::units::encode_tenths;
///
/// assert_eq!(encode_tenths(12.34), 123);
/// assert_eq!(encode_tenths(-1.0), -10);
/// ```
pub fn encode_tenths(degrees: f64) -> i64 {
    (degrees * 10.0).round() as i64
}

/// 线上整数（0.1 度单位）解码为角度（度）
pub fn decode_tenths(raw: i64) -> f64 {
    raw as f64 / 10.0
}

/// 解析字符串的数值前缀
///
/// 元数据值常带单位后缀（如 `10[ms]`、`31ms`），本函数提取开头的
/// 有符号小数并解析，无合法前缀时返回 `None`。
pub fn parse_leading_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let mut end = 0;
    for (idx, ch) in value.char_indices() {
        let ok = ch.is_ascii_digit()
            || ch == '.'
            || (idx == 0 && (ch == '+' || ch == '-'));
        if !ok {
            break;
        }
        end = idx + ch.len_utf8();
    }
    value[..end].parse::<f64>().ok()
}
