use std::sync::Arc;

use application::{FanOutBus, InMemoryBus};
use config::{AppConfig, BusBackend};
use thiserror::Error;

use crate::redis::{RedisBus, RedisError};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
}

/// 按配置选择总线后端
pub async fn build_bus(config: &AppConfig) -> Result<Arc<dyn FanOutBus>, InfrastructureError> {
    match config.bus.backend {
        BusBackend::Memory => {
            tracing::info!(capacity = config.bus.capacity, "using in-memory fan-out bus");
            Ok(Arc::new(InMemoryBus::new(config.bus.capacity)))
        }
        BusBackend::Redis => {
            let bus = RedisBus::connect(&config.redis, config.bus.capacity).await?;
            tracing::info!(prefix = %config.redis.channel_prefix, "using redis fan-out bus");
            Ok(Arc::new(bus))
        }
    }
}
