//! 最新遥测帧的单槽缓存
//!
//! 接收线程与控制线程之间唯一的共享状态。只保留最新一帧：
//! 没被读走就被替换的帧静默丢弃，控制环要的是"当前状态"而不是
//! 历史回放，宁可丢帧也不积压。

use std::sync::Arc;

use parking_lot::Mutex;

use ugo_wire::TelemetryFrame;

/// 线程安全的最新帧缓存
///
/// 帧在 `Arc` 里共享，快照只克隆指针不克隆数据。使用
/// `parking_lot::Mutex`，无 Poison。
///
/// # 示例
///
/// ```rust
/// use std::sync::Arc;
/// use ugo_driver::JointStateCache;
/// use ugo_wire::FrameBuilder;
///
/// let cache = Arc::new(JointStateCache::new());
/// assert!(cache.snapshot().is_none());
///
/// let mut builder = FrameBuilder::new();
/// builder.consume_line("vsd");
/// builder.consume_line("id,11");
/// builder.consume_line("agl,123");
/// cache.update(builder.force_build().unwrap());
///
/// let frame = cache.snapshot().unwrap();
/// assert_eq!(frame.angle_deg(11), Some(12.3));
/// ```
#[derive(Debug, Default)]
pub struct JointStateCache {
    slot: Mutex<Option<Arc<TelemetryFrame>>>,
}

impl JointStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子替换为新帧
    pub fn update(&self, frame: TelemetryFrame) {
        *self.slot.lock() = Some(Arc::new(frame));
    }

    /// 当前帧，尚无遥测时返回 `None`
    ///
    /// 不阻塞等待新帧，不改变缓存内容。
    pub fn snapshot(&self) -> Option<Arc<TelemetryFrame>> {
        self.slot.lock().clone()
    }

    /// 是否已收到过至少一帧
    pub fn has_frame(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// 清空缓存（断开连接时调用）
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}
