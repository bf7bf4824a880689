//! Redis 消息订阅者
//!
//! 专用的异步 PubSub 连接订阅两个全局频道，并以模式订阅全部房间频道；
//! 房间过滤由各进程在本地完成。连接断开后按指数退避重新订阅。

use domain::{BusChannel, BusEnvelope};
use futures_util::StreamExt;
use redis::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::redis::{RedisError, RedisResult};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// 订阅参数
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    pub channel_prefix: String,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

impl SubscriberSettings {
    /// 需要订阅的频道与模式
    pub fn channels(&self) -> (Vec<String>, String) {
        (
            vec![
                BusChannel::PresenceStatus.name(&self.channel_prefix),
                BusChannel::UserNotification.name(&self.channel_prefix),
            ],
            BusChannel::room_pattern(&self.channel_prefix),
        )
    }

    /// 第 `attempt` 次重连前的等待时间（从 1 开始）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnect_interval
            .saturating_mul(factor)
            .min(MAX_BACKOFF)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ListenOutcome {
    /// 订阅成功后连接断开
    Disconnected,
    /// 收到关闭信号或接收端已关闭
    Stopped,
}

/// Redis 消息订阅者
pub struct RedisSubscriber {
    client: Client,
    settings: SubscriberSettings,
}

impl RedisSubscriber {
    pub fn new(client: Client, settings: SubscriberSettings) -> Self {
        Self { client, settings }
    }

    /// 启动后台监听，事件写入 `sender`，直到 `shutdown` 被取消
    pub fn spawn(
        self,
        sender: mpsc::Sender<BusEnvelope>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move { self.listen_loop(sender, shutdown).await })
    }

    async fn listen_loop(self, sender: mpsc::Sender<BusEnvelope>, shutdown: CancellationToken) {
        let mut retry_count = 0;

        while !shutdown.is_cancelled() {
            match self.create_and_listen(&sender, &shutdown).await {
                Ok(ListenOutcome::Stopped) => break,
                Ok(ListenOutcome::Disconnected) => {
                    warn!("Redis 订阅连接断开，准备重新订阅");
                    retry_count = 1;
                }
                Err(e) => {
                    error!("Redis 订阅错误: {}", e);
                    retry_count += 1;
                    if retry_count > self.settings.max_reconnect_attempts {
                        error!(retry_count, "Redis 订阅重连失败，已达最大重试次数");
                        break;
                    }
                }
            }

            let delay = self.settings.backoff(retry_count);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Redis 订阅监听已停止");
    }

    async fn create_and_listen(
        &self,
        sender: &mpsc::Sender<BusEnvelope>,
        shutdown: &CancellationToken,
    ) -> RedisResult<ListenOutcome> {
        let mut pubsub =
            self.client
                .get_async_pubsub()
                .await
                .map_err(|e| RedisError::ConnectionError {
                    message: format!("获取 PubSub 连接失败: {}", e),
                })?;

        let (channels, room_pattern) = self.settings.channels();
        for channel in &channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| RedisError::SubscribeError {
                    message: format!("订阅频道 {} 失败: {}", channel, e),
                })?;
        }
        pubsub
            .psubscribe(&room_pattern)
            .await
            .map_err(|e| RedisError::SubscribeError {
                message: format!("订阅模式 {} 失败: {}", room_pattern, e),
            })?;
        info!(?channels, room_pattern, "已订阅 Redis 频道");

        let mut messages = pubsub.into_on_message();
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => return Ok(ListenOutcome::Stopped),
                msg = messages.next() => msg,
            };
            let Some(msg) = msg else {
                return Ok(ListenOutcome::Disconnected);
            };

            let channel = msg.get_channel_name().to_string();
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(channel, "获取消息负载失败: {}", e);
                    continue;
                }
            };
            let Some(envelope) = decode_envelope(&channel, &payload) else {
                continue;
            };

            debug!(channel, "接收到总线事件");
            if sender.send(envelope).await.is_err() {
                debug!("总线接收端已关闭");
                return Ok(ListenOutcome::Stopped);
            }
        }
    }
}

/// 解码负载，格式错误时记录并跳过
fn decode_envelope(channel: &str, payload: &str) -> Option<BusEnvelope> {
    match serde_json::from_str(payload) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(channel, "丢弃无法解析的总线消息: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{PresenceStatus, UserId};

    fn settings() -> SubscriberSettings {
        SubscriberSettings {
            channel_prefix: "chat:".into(),
            reconnect_interval: Duration::from_millis(500),
            max_reconnect_attempts: 5,
        }
    }

    #[test]
    fn subscribes_global_channels_and_room_pattern() {
        let (channels, pattern) = settings().channels();
        assert_eq!(channels, vec!["chat:user:status", "chat:notification:send"]);
        assert_eq!(pattern, "chat:room:*");
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let settings = settings();
        assert_eq!(settings.backoff(1), Duration::from_millis(500));
        assert_eq!(settings.backoff(2), Duration::from_millis(1000));
        assert_eq!(settings.backoff(4), Duration::from_millis(4000));
        assert_eq!(settings.backoff(20), MAX_BACKOFF);
    }

    #[test]
    fn malformed_payload_is_skipped() {
        assert!(decode_envelope("chat:user:status", "{not json").is_none());

        let envelope = BusEnvelope::PresenceChanged {
            user_id: UserId::new(),
            status: PresenceStatus::Offline,
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_string(&envelope).unwrap();
        assert_eq!(decode_envelope("chat:user:status", &payload), Some(envelope));
    }
}
