use std::time::Duration;

use serde::Deserialize;

/// 重连与出站队列参数
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub queue_capacity: usize,
    /// 超过该时长的排队事件在重放时丢弃
    pub max_queue_age_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            max_attempts: 5,
            queue_capacity: 100,
            max_queue_age_secs: 60,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_queue_age(&self) -> Duration {
        Duration::from_secs(self.max_queue_age_secs)
    }
}
