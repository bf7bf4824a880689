//! Redis 消息发布者
//!
//! 通过 `ConnectionManager` 复用一条多路复用连接，断线时由其自动重连。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use domain::BusEnvelope;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::redis::{RedisError, RedisResult};

const MAX_PUBLISH_RETRIES: u32 = 3;

/// 频道统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub messages_sent: u64,
    pub errors: u64,
}

/// Redis 发布者
pub struct RedisPublisher {
    connection: ConnectionManager,
    channel_prefix: String,
    channel_stats: Arc<Mutex<HashMap<String, ChannelStats>>>,
}

impl RedisPublisher {
    pub async fn new(client: &Client, channel_prefix: impl Into<String>) -> RedisResult<Self> {
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| RedisError::ConnectionError {
                message: format!("创建 Redis 连接管理器失败: {}", e),
            })?;

        info!("Redis 发布者创建成功");
        Ok(Self {
            connection,
            channel_prefix: channel_prefix.into(),
            channel_stats: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// 发布到事件所属频道，返回收到消息的订阅者数量
    pub async fn publish(&self, envelope: &BusEnvelope) -> RedisResult<u32> {
        let channel = envelope.channel().name(&self.channel_prefix);
        let payload = serde_json::to_string(envelope)?;

        let result = self.publish_with_retry(&channel, &payload).await;
        self.update_channel_stats(&channel, result.is_ok());
        result
    }

    async fn publish_with_retry(&self, channel: &str, payload: &str) -> RedisResult<u32> {
        let mut retry_count = 0;
        loop {
            let mut connection = self.connection.clone();
            match connection.publish::<_, _, u32>(channel, payload).await {
                Ok(receivers) => {
                    debug!(channel, receivers, "发布消息成功");
                    return Ok(receivers);
                }
                Err(e) if retry_count < MAX_PUBLISH_RETRIES => {
                    let delay = Duration::from_millis(100 * 2_u64.pow(retry_count));
                    debug!(channel, retry_count, ?delay, "发布失败，准备重试: {}", e);
                    sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => {
                    error!(channel, "发布消息失败: {}", e);
                    return Err(RedisError::PublishError {
                        message: format!("发布到 {} 失败: {}", channel, e),
                    });
                }
            }
        }
    }

    fn update_channel_stats(&self, channel: &str, success: bool) {
        let mut stats = self
            .channel_stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = stats.entry(channel.to_string()).or_default();
        if success {
            entry.messages_sent += 1;
        } else {
            entry.errors += 1;
        }
    }

    /// 获取频道统计信息
    pub fn channel_stats(&self) -> HashMap<String, ChannelStats> {
        self.channel_stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
