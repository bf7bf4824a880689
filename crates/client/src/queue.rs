//! 断线期间的出站事件队列

use std::collections::VecDeque;
use std::time::Duration;

use domain::ClientEvent;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event: ClientEvent,
    pub enqueued_at: Instant,
}

/// 有界 FIFO，超出容量时淘汰最旧的条目
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedEvent>,
    capacity: usize,
    max_age: Duration,
}

impl OutboundQueue {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            max_age,
        }
    }

    /// 入队，返回被淘汰的条目
    pub fn push(&mut self, event: ClientEvent) -> Option<QueuedEvent> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            tracing::warn!(event = old.event.name(), "outbound queue full, dropping oldest event");
        }
        self.entries.push_back(QueuedEvent {
            event,
            enqueued_at: Instant::now(),
        });
        evicted
    }

    /// 按入队顺序取出全部仍然新鲜的事件，过期条目记录后丢弃
    pub fn drain_fresh(&mut self) -> Vec<ClientEvent> {
        let now = Instant::now();
        let mut fresh = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let age = now.saturating_duration_since(entry.enqueued_at);
            if age > self.max_age {
                tracing::warn!(
                    event = entry.event.name(),
                    age_secs = age.as_secs(),
                    "dropping stale queued event"
                );
                continue;
            }
            fresh.push(entry.event);
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::RoomId;

    fn typing(room_id: RoomId) -> ClientEvent {
        ClientEvent::TypingStart { room_id }
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let rooms: Vec<RoomId> = (0..3).map(|_| RoomId::new()).collect();
        let mut queue = OutboundQueue::new(2, Duration::from_secs(60));

        assert!(queue.push(typing(rooms[0])).is_none());
        assert!(queue.push(typing(rooms[1])).is_none());
        let evicted = queue.push(typing(rooms[2])).unwrap();

        assert_eq!(evicted.event, typing(rooms[0]));
        assert_eq!(queue.drain_fresh(), vec![typing(rooms[1]), typing(rooms[2])]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_skipped() {
        let old = RoomId::new();
        let recent = RoomId::new();
        let mut queue = OutboundQueue::new(10, Duration::from_secs(60));

        queue.push(typing(old));
        tokio::time::advance(Duration::from_secs(45)).await;
        queue.push(typing(recent));
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(queue.drain_fresh(), vec![typing(recent)]);
        assert_eq!(queue.len(), 0);
    }
}
