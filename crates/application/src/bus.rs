//! 扇出总线契约
//!
//! 所有进程向同一组频道发布事件，并各自订阅这些频道；
//! 同一频道内按发布顺序投递，跨频道不保证顺序。

use async_trait::async_trait;
use domain::BusEnvelope;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("payload encoding failed: {0}")]
    Codec(String),
}

impl BusError {
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish(message.into())
    }

    pub fn subscribe(message: impl Into<String>) -> Self {
        Self::Subscribe(message.into())
    }
}

/// 一个进程对总线全部频道的订阅
pub struct BusSubscription {
    receiver: mpsc::Receiver<BusEnvelope>,
}

impl BusSubscription {
    pub fn new(receiver: mpsc::Receiver<BusEnvelope>) -> Self {
        Self { receiver }
    }

    /// 下一条事件；总线关闭后返回 `None`
    pub async fn recv(&mut self) -> Option<BusEnvelope> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait FanOutBus: Send + Sync {
    /// 发布到事件所属频道
    async fn publish(&self, envelope: BusEnvelope) -> Result<(), BusError>;

    /// 订阅全部房间频道与全局频道
    async fn subscribe(&self) -> Result<BusSubscription, BusError>;
}
