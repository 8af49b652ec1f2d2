//! # Ugo Wire
//!
//! ugo 控制器的行式 CSV 协议定义（无 I/O 依赖）
//!
//! ## 模块
//!
//! - `frame`: 遥测帧类型与访问器
//! - `builder`: 行级状态机，将文本行组装为遥测帧
//! - `stream`: 字节流解析器（跨数据报的半行缓存）
//! - `command`: 指令报文构建（Full / Compact 两种成帧模式）
//! - `units`: 数值缩放与前缀解析工具
//! - `timestamp`: UTC 毫秒时间戳
//!
//! ## 行格式
//!
//! 每行以逗号分隔，首个 token 为键，其余为值。所有 token 在解析前
//! 去除首尾空白（真实控制器会用空格对齐列）。`vsd` 行既是帧边界，
//! 也携带 `key:value` 形式的元数据。

pub mod builder;
pub mod command;
pub mod frame;
pub mod stream;
pub mod timestamp;
pub mod units;

// 重新导出常用类型
pub use builder::FrameBuilder;
pub use command::{CommandMode, CommandPayload, FramingMode, WireError};
pub use frame::{FrameHealth, SeriesKey, TelemetryFrame};
pub use stream::StreamParser;
pub use timestamp::utc_now_ms;

/// 关节编号（`id` 行中的整数标识）
pub type JointId = u16;

/// 帧内序列的 `SmallVec` 内联容量
///
/// 双臂配置为 8 + 8 个关节，遥测帧在此规模内不触发堆分配。
pub const INLINE_JOINTS: usize = 16;
