use std::time::Duration;

use crate::ReconnectConfig;

/// 指数退避：`min(base × 2^attempt, max)`，attempt 从 0 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay())
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}
