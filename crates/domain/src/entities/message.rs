//! 消息实体定义
//!
//! `NewMessage` 是交给持久化协作者的创建请求，`Message` 是其返回、用于广播的完整记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DomainError, MessageId, RoomId, UserId, UserSummary};

/// 单条消息内容的最大字符数
pub const MAX_MESSAGE_LENGTH: usize = 5000;

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    File,
    System,
}

/// 已读回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// 消息创建请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<MessageId>,
}

impl NewMessage {
    /// 构造文本消息创建请求，校验内容非空且不超长
    pub fn text(
        room_id: RoomId,
        sender_id: UserId,
        content: impl Into<String>,
        reply_to: Option<MessageId>,
    ) -> Result<Self, DomainError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(DomainError::validation("content", "message cannot be empty"));
        }
        if content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(DomainError::validation(
                "content",
                format!("message cannot exceed {MAX_MESSAGE_LENGTH} characters"),
            ));
        }

        Ok(Self {
            room_id,
            sender_id,
            content,
            message_type: MessageType::Text,
            reply_to,
        })
    }
}

/// 持久化后的消息记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    /// 已填充的发送者信息
    pub sender: UserSummary,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// 由创建请求生成记录
    pub fn from_new(draft: NewMessage, sender: UserSummary, created_at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            room_id: draft.room_id,
            sender,
            content: draft.content,
            message_type: draft.message_type,
            reply_to: draft.reply_to,
            read_by: Vec::new(),
            created_at,
        }
    }

    /// 标记为已读。同一用户重复标记不会产生第二条回执，返回值表示是否新增。
    pub fn mark_read(&mut self, user_id: UserId, at: DateTime<Utc>) -> bool {
        if self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            user_id,
            read_at: at,
        });
        true
    }

    pub fn is_read_by(&self, user_id: UserId) -> bool {
        self.read_by.iter().any(|receipt| receipt.user_id == user_id)
    }
}
