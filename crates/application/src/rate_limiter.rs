//! 固定窗口限流器
//!
//! 按 (用户, 事件类别) 计数。窗口过期后的第一次调用重新开窗，计数归零。
//! 后台清理只影响内存占用，不影响判定结果。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use config::{RateLimitConfig, WindowConfig};
use domain::UserId;
use tokio::task::JoinHandle;

use crate::clock::Clock;

/// 受限流约束的事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Message,
    Typing,
}

/// 某一类别的窗口策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub max_events: u32,
    pub window: Duration,
}

impl From<WindowConfig> for WindowPolicy {
    fn from(value: WindowConfig) -> Self {
        Self {
            max_events: value.max_events,
            window: Duration::seconds(value.window_secs as i64),
        }
    }
}

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Rejected { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// 限流器当前状态，用于日志和测试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub tracked_windows: usize,
}

pub struct RateLimiter {
    message: WindowPolicy,
    typing: WindowPolicy,
    grace: Duration,
    clock: Arc<dyn Clock>,
    windows: RwLock<HashMap<(UserId, EventClass), Window>>,
}

impl RateLimiter {
    pub fn new(
        message: WindowPolicy,
        typing: WindowPolicy,
        grace: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            message,
            typing,
            grace,
            clock,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.message.into(),
            config.typing.into(),
            Duration::seconds(config.grace_secs as i64),
            clock,
        )
    }

    pub fn policy(&self, class: EventClass) -> WindowPolicy {
        match class {
            EventClass::Message => self.message,
            EventClass::Typing => self.typing,
        }
    }

    /// 检查并消耗一次配额。超限时不计数。
    pub fn check_and_consume(&self, user_id: UserId, class: EventClass) -> RateDecision {
        let policy = self.policy(class);
        let now = self.clock.now();
        let mut windows = self.write();

        let window = windows.entry((user_id, class)).or_insert(Window {
            count: 0,
            reset_at: now + policy.window,
        });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + policy.window;
        }

        if window.count >= policy.max_events {
            let remaining_ms = (window.reset_at - now).num_milliseconds().max(0) as u64;
            return RateDecision::Rejected {
                retry_after_secs: remaining_ms.div_ceil(1000),
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: policy.max_events - window.count,
        }
    }

    /// 删除过期超过宽限期的窗口，返回删除数量
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let grace = self.grace;
        let mut windows = self.write();
        let before = windows.len();
        windows.retain(|_, window| now <= window.reset_at + grace);
        before - windows.len()
    }

    /// 清除某个用户的全部窗口
    pub fn reset(&self, user_id: UserId) {
        self.write().retain(|(owner, _), _| *owner != user_id);
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            tracked_windows: self.read().len(),
        }
    }

    /// 启动周期性清理任务
    pub fn spawn_sweeper(limiter: Arc<Self>, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // 第一次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired rate limit windows");
                }
            }
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<(UserId, EventClass), Window>> {
        self.windows
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<(UserId, EventClass), Window>> {
        self.windows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::from_config(&RateLimitConfig::default(), clock)
    }

    #[test]
    fn rejects_after_max_events_without_consuming() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(clock.clone());
        let user = UserId::new();

        for i in 0..20 {
            assert_eq!(
                limiter.check_and_consume(user, EventClass::Message),
                RateDecision::Allowed { remaining: 19 - i }
            );
        }

        clock.advance(Duration::milliseconds(15_500));
        assert_eq!(
            limiter.check_and_consume(user, EventClass::Message),
            RateDecision::Rejected {
                retry_after_secs: 45
            }
        );
        // 拒绝不计数，窗口结束前一直被拒绝
        clock.advance(Duration::milliseconds(44_000));
        assert_eq!(
            limiter.check_and_consume(user, EventClass::Message),
            RateDecision::Rejected {
                retry_after_secs: 1
            }
        );
    }

    #[test]
    fn window_boundary_resets_counter() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(clock.clone());
        let user = UserId::new();

        for _ in 0..20 {
            limiter.check_and_consume(user, EventClass::Message);
        }
        assert!(!limiter.check_and_consume(user, EventClass::Message).is_allowed());

        clock.advance(Duration::seconds(60));
        assert_eq!(
            limiter.check_and_consume(user, EventClass::Message),
            RateDecision::Allowed { remaining: 19 }
        );
    }

    #[test]
    fn classes_and_users_are_independent() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(clock);
        let alice = UserId::new();
        let bob = UserId::new();

        for _ in 0..20 {
            limiter.check_and_consume(alice, EventClass::Message);
        }
        assert!(!limiter.check_and_consume(alice, EventClass::Message).is_allowed());
        assert!(limiter.check_and_consume(alice, EventClass::Typing).is_allowed());
        assert!(limiter.check_and_consume(bob, EventClass::Message).is_allowed());
    }

    #[test]
    fn sweep_keeps_windows_within_grace() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(clock.clone());
        let user = UserId::new();

        limiter.check_and_consume(user, EventClass::Message);
        limiter.check_and_consume(user, EventClass::Typing);
        assert_eq!(limiter.stats().tracked_windows, 2);

        // 窗口已过期但仍在宽限期内
        clock.advance(Duration::seconds(90));
        assert_eq!(limiter.sweep_expired(), 0);

        clock.advance(Duration::seconds(31));
        assert_eq!(limiter.sweep_expired(), 2);
        assert_eq!(limiter.stats().tracked_windows, 0);
    }

    #[test]
    fn reset_clears_only_that_user() {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(clock);
        let alice = UserId::new();
        let bob = UserId::new();

        limiter.check_and_consume(alice, EventClass::Message);
        limiter.check_and_consume(bob, EventClass::Message);
        limiter.reset(alice);

        assert_eq!(limiter.stats().tracked_windows, 1);
    }

    #[test]
    fn poisoned_lock_does_not_disable_reset() {
        let clock = Arc::new(ManualClock::default());
        let limiter = Arc::new(limiter(clock));
        let alice = UserId::new();
        limiter.check_and_consume(alice, EventClass::Message);

        let poisoner = limiter.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.windows.write().unwrap();
            panic!("poison the window table");
        })
        .join();
        assert!(limiter.windows.is_poisoned());

        assert_eq!(limiter.stats().tracked_windows, 1);
        limiter.reset(alice);
        assert_eq!(limiter.stats().tracked_windows, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_drops_expired_windows() {
        let clock = Arc::new(ManualClock::default());
        let limiter = Arc::new(limiter(clock.clone()));
        limiter.check_and_consume(UserId::new(), EventClass::Message);
        limiter.check_and_consume(UserId::new(), EventClass::Typing);

        let sweeper = RateLimiter::spawn_sweeper(limiter.clone(), StdDuration::from_secs(60));
        tokio::task::yield_now().await;
        assert_eq!(limiter.stats().tracked_windows, 2);

        // 超过窗口加宽限期
        clock.advance(Duration::seconds(121));
        tokio::time::sleep(StdDuration::from_secs(61)).await;
        assert_eq!(limiter.stats().tracked_windows, 0);

        sweeper.abort();
    }
}
