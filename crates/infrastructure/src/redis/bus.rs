//! 基于 Redis Pub/Sub 的扇出总线

use std::sync::Arc;

use application::{BusError, BusSubscription, FanOutBus};
use async_trait::async_trait;
use config::RedisConfig;
use domain::BusEnvelope;
use redis::Client;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::redis::{RedisError, RedisPublisher, RedisResult, RedisSubscriber, SubscriberSettings};

/// 多实例共享的总线：所有进程向同一组频道发布，并各自订阅
pub struct RedisBus {
    client: Client,
    publisher: Arc<RedisPublisher>,
    settings: SubscriberSettings,
    capacity: usize,
    shutdown: CancellationToken,
}

impl RedisBus {
    pub async fn connect(config: &RedisConfig, capacity: usize) -> RedisResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| RedisError::ConfigError {
            message: format!("创建 Redis 客户端失败: {}", e),
        })?;
        let publisher = RedisPublisher::new(&client, config.channel_prefix.clone()).await?;

        Ok(Self {
            client,
            publisher: Arc::new(publisher),
            settings: SubscriberSettings {
                channel_prefix: config.channel_prefix.clone(),
                reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
                max_reconnect_attempts: config.max_reconnect_attempts,
            },
            capacity,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn publisher(&self) -> &RedisPublisher {
        &self.publisher
    }

    /// 停止所有订阅监听
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for RedisBus {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl FanOutBus for RedisBus {
    async fn publish(&self, envelope: BusEnvelope) -> Result<(), BusError> {
        self.publisher.publish(&envelope).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<BusSubscription, BusError> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        RedisSubscriber::new(self.client.clone(), self.settings.clone())
            .spawn(sender, self.shutdown.child_token());
        Ok(BusSubscription::new(receiver))
    }
}
