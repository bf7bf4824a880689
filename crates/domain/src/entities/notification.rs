//! 通知实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Message, MessageId, NotificationId, Room, RoomId, UserId};

/// 通知标题最大字符数
pub const MAX_TITLE_LENGTH: usize = 100;
/// 通知正文最大字符数
pub const MAX_BODY_LENGTH: usize = 500;
/// 新消息通知正文截取的字符数
const MESSAGE_PREVIEW_LENGTH: usize = 100;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Mention,
    RoomInvite,
    RoomUpdate,
    System,
}

/// 通知关联的数据
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserId>,
}

/// 通知创建请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

impl NewNotification {
    /// 构造通知，标题和正文按上限截断
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        title: impl AsRef<str>,
        body: impl AsRef<str>,
        data: NotificationData,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: truncate_chars(title.as_ref(), MAX_TITLE_LENGTH),
            body: truncate_chars(body.as_ref(), MAX_BODY_LENGTH),
            data,
        }
    }

    /// 房间新消息通知
    pub fn for_message(recipient: UserId, room: &Room, message: &Message) -> Self {
        Self::new(
            recipient,
            NotificationKind::Message,
            format!("New message in {}", room.name),
            truncate_chars(&message.content, MESSAGE_PREVIEW_LENGTH),
            NotificationData {
                room: Some(room.id),
                message: Some(message.id),
                sender: Some(message.sender.id),
            },
        )
    }
}

/// 持久化后的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: NotificationData,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(draft: NewNotification, created_at: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            user_id: draft.user_id,
            kind: draft.kind,
            title: draft.title,
            body: draft.body,
            data: draft.data,
            read: false,
            created_at,
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewMessage, UserSummary};

    #[test]
    fn message_notification_previews_first_hundred_chars() {
        let sender = UserSummary::new(UserId::new(), "alice");
        let recipient = UserId::new();
        let room = Room::new("general", vec![sender.id, recipient], Utc::now());
        let content = "é".repeat(150);
        let draft = NewMessage::text(room.id, sender.id, content, None).unwrap();
        let message = Message::from_new(draft, sender.clone(), Utc::now());

        let notification = NewNotification::for_message(recipient, &room, &message);

        assert_eq!(notification.title, "New message in general");
        assert_eq!(notification.body.chars().count(), 100);
        assert_eq!(notification.kind, NotificationKind::Message);
        assert_eq!(notification.data.room, Some(room.id));
        assert_eq!(notification.data.message, Some(message.id));
        assert_eq!(notification.data.sender, Some(sender.id));
    }

    #[test]
    fn title_is_capped() {
        let draft = NewNotification::new(
            UserId::new(),
            NotificationKind::System,
            "t".repeat(300),
            "body",
            NotificationData::default(),
        );
        assert_eq!(draft.title.len(), MAX_TITLE_LENGTH);
    }
}
