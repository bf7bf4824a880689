//! 总线事件
//!
//! 每个进程把房间/用户事件发布到共享频道，并订阅同样的频道，
//! 收到后只投递给本进程持有的连接。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Message, MessageId, Notification, PresenceStatus, RoomId, UserId};

/// 总线上传递的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BusEnvelope {
    /// 房间消息广播
    RoomMessage { room_id: RoomId, message: Message },
    /// 已读确认，和消息共用房间频道以保持先后顺序
    ReadReceipt {
        room_id: RoomId,
        message_id: MessageId,
        user_id: UserId,
    },
    /// 在线状态变化
    PresenceChanged {
        user_id: UserId,
        status: PresenceStatus,
        timestamp: DateTime<Utc>,
    },
    /// 发给单个用户的通知
    UserNotification {
        user_id: UserId,
        notification: Notification,
    },
}

impl BusEnvelope {
    /// 事件所属的频道
    pub fn channel(&self) -> BusChannel {
        match self {
            BusEnvelope::RoomMessage { room_id, .. } | BusEnvelope::ReadReceipt { room_id, .. } => {
                BusChannel::Room(*room_id)
            }
            BusEnvelope::PresenceChanged { .. } => BusChannel::PresenceStatus,
            BusEnvelope::UserNotification { .. } => BusChannel::UserNotification,
        }
    }
}

/// 总线频道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusChannel {
    /// 按房间划分的广播频道
    Room(RoomId),
    /// 全局在线状态频道
    PresenceStatus,
    /// 用户通知频道
    UserNotification,
}

impl BusChannel {
    pub const ROOM_SEGMENT: &'static str = "room:";
    pub const PRESENCE_STATUS: &'static str = "user:status";
    pub const USER_NOTIFICATION: &'static str = "notification:send";

    /// 带前缀的频道名
    pub fn name(&self, prefix: &str) -> String {
        match self {
            BusChannel::Room(room_id) => format!("{prefix}{}{room_id}", Self::ROOM_SEGMENT),
            BusChannel::PresenceStatus => format!("{prefix}{}", Self::PRESENCE_STATUS),
            BusChannel::UserNotification => format!("{prefix}{}", Self::USER_NOTIFICATION),
        }
    }

    /// 匹配所有房间频道的模式
    pub fn room_pattern(prefix: &str) -> String {
        format!("{prefix}{}*", Self::ROOM_SEGMENT)
    }
}
