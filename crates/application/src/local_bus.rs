// 进程内总线实现，单实例部署和测试使用
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::BusEnvelope;
use tokio::sync::{broadcast, mpsc};

use crate::bus::{BusError, BusSubscription, FanOutBus};

/// 基于 tokio broadcast 的总线。克隆共享同一通道，可模拟共享总线的多个进程。
#[derive(Clone)]
pub struct InMemoryBus {
    sender: broadcast::Sender<BusEnvelope>,
    capacity: usize,
    published: Arc<Mutex<Vec<BusEnvelope>>>,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 已发布事件的记录，按发布顺序
    pub fn published(&self) -> Vec<BusEnvelope> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl FanOutBus for InMemoryBus {
    async fn publish(&self, envelope: BusEnvelope) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope.clone());
        // 没有订阅者时事件无人接收，这不是错误
        if self.sender.send(envelope).is_err() {
            tracing::debug!("published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<BusSubscription, BusError> {
        let mut receiver = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(self.capacity);

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-memory bus subscriber lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(BusSubscription::new(rx))
    }
}
