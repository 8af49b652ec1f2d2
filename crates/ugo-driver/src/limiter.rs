//! 单调时钟节拍闸
//!
//! 指令发送前必须经过 [`RateLimiter::wait`]，保证下行报文的最小
//! 间隔。控制器固件按固定周期消费指令，主机发得过快只会在固件
//! 侧丢弃，发送节拍在主机侧统一约束。

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spin_sleep::SpinSleeper;

/// 全局节拍闸
///
/// 多线程并发调用 `wait()` 时通过内部锁串行化，约束的是所有
/// 调用者合计的节拍，而不是每线程各自的节拍。发送方应当只有
/// 一条控制线程，多线程共用同一个限速器会互相拖慢，这是调用方
/// 的使用约定。
///
/// 使用 `spin_sleep` 而不是 `std::thread::sleep`，100Hz 节拍下
/// 系统睡眠的毫秒级抖动不可接受。
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_return: Mutex<Option<Instant>>,
    sleeper: SpinSleeper,
}

impl RateLimiter {
    /// 按目标频率构造，`rate_hz <= 0` 表示不限速
    pub fn from_rate_hz(rate_hz: f64) -> Self {
        let interval = if rate_hz > 0.0 {
            Duration::from_secs_f64(1.0 / rate_hz)
        } else {
            Duration::ZERO
        };
        Self::new(interval)
    }

    /// 按最小间隔构造，`Duration::ZERO` 表示不限速
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_return: Mutex::new(None),
            sleeper: SpinSleeper::default(),
        }
    }

    /// 阻塞到距上一次 `wait` 返回至少一个间隔
    ///
    /// 首次调用立即返回。不限速时恒为空操作。
    pub fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        // 持锁睡眠：并发调用者排队，各自拿到独立的时间片
        let mut last = self.last_return.lock();
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                self.sleeper.sleep(self.interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    /// 配置的最小间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 是否启用限速
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_disabled_limiter_never_blocks() {
        let limiter = RateLimiter::from_rate_hz(0.0);
        assert!(!limiter.is_enabled());
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_first_wait_returns_immediately() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();
        limiter.wait();
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn test_single_thread_spacing() {
        // 每对相邻返回至少间隔一个周期，5 次 wait 合计至少 4 个周期；
        // 用总时长断言，调度抖动只会让它更长
        let interval = Duration::from_millis(20);
        let limiter = RateLimiter::new(interval);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait();
        }
        assert!(start.elapsed() >= Duration::from_millis(79));
    }

    #[test]
    fn test_multi_thread_global_cadence() {
        // 限速是全局的：4 线程各 3 次 wait 合计 12 次，首个立即返回，
        // 其余 11 次各占一个周期
        let interval = Duration::from_millis(10);
        let limiter = Arc::new(RateLimiter::new(interval));

        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..3 {
                    limiter.wait();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(108));
    }

    #[test]
    fn test_rate_to_interval() {
        let limiter = RateLimiter::from_rate_hz(100.0);
        assert_eq!(limiter.interval(), Duration::from_millis(10));
    }
}
