//! 客户端事件面
//!
//! 入站与出站事件都是封闭的枚举，序列化形态为
//! `{"event": "<snake_case 名称>", "data": {...}}`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Message, MessageId, Notification, PresenceStatus, RoomId, UserId, UserSummary};

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// 加入房间
    JoinRoom { room_id: RoomId },
    /// 离开房间
    LeaveRoom { room_id: RoomId },
    /// 发送消息
    SendMessage {
        room_id: RoomId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<MessageId>,
    },
    /// 开始输入
    TypingStart { room_id: RoomId },
    /// 停止输入
    TypingStop { room_id: RoomId },
    /// 标记消息已读
    MessageRead { message_id: MessageId },
}

impl ClientEvent {
    /// 事件名称，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join_room",
            ClientEvent::LeaveRoom { .. } => "leave_room",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::TypingStart { .. } => "typing_start",
            ClientEvent::TypingStop { .. } => "typing_stop",
            ClientEvent::MessageRead { .. } => "message_read",
        }
    }
}

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// 房间新消息
    NewMessage(Message),
    /// 有用户加入房间
    UserJoined { room_id: RoomId, user: UserSummary },
    /// 有用户离开房间
    UserLeft { room_id: RoomId, user: UserSummary },
    /// 输入状态变化
    UserTyping {
        room_id: RoomId,
        user: UserSummary,
        typing: bool,
    },
    /// 已读确认
    MessageRead {
        message_id: MessageId,
        user_id: UserId,
    },
    /// 用户在线状态变化
    PresenceStatus {
        user_id: UserId,
        status: PresenceStatus,
        timestamp: DateTime<Utc>,
    },
    /// 个人通知
    Notification(Notification),
    /// 连接建立时的一次性在线用户快照
    OnlineUsers(Vec<UserSummary>),
    /// 错误，仅发送给触发者
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after: Option<u64>,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::UserJoined { .. } => "user_joined",
            ServerEvent::UserLeft { .. } => "user_left",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::MessageRead { .. } => "message_read",
            ServerEvent::PresenceStatus { .. } => "presence_status",
            ServerEvent::Notification(_) => "notification",
            ServerEvent::OnlineUsers(_) => "online_users",
            ServerEvent::Error { .. } => "error",
        }
    }
}
