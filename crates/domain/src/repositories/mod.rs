//! 外部协作者接口
//!
//! 核心只通过这些抽象访问房间目录、文档存储和用户目录，具体实现由外层提供。
//! 所有方法都可能因存储故障返回 `DomainError::Storage`。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DomainResult;
use crate::{
    Message, MessageId, NewMessage, NewNotification, Notification, PresenceStatus, Room, RoomId,
    UserId, UserSummary,
};

/// 房间目录
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// 按 ID 查找房间，不存在时返回 `None`
    async fn find_room(&self, room_id: RoomId) -> DomainResult<Option<Room>>;

    /// 刷新房间最后活跃时间
    async fn touch_activity(&self, room_id: RoomId, at: DateTime<Utc>) -> DomainResult<()>;
}

/// 消息存储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 持久化消息并返回填充了发送者信息的完整记录
    async fn create_message(&self, draft: NewMessage) -> DomainResult<Message>;

    /// 追加已读回执。消息不存在时返回 `None`；同一用户重复标记不产生第二条回执。
    async fn mark_read(
        &self,
        message_id: MessageId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<Message>>;

    /// 房间最近的消息，按创建时间升序
    async fn recent_messages(&self, room_id: RoomId, limit: usize) -> DomainResult<Vec<Message>>;
}

/// 通知存储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, draft: NewNotification) -> DomainResult<Notification>;
}

/// 用户目录
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> DomainResult<Option<UserSummary>>;

    /// 持久化在线状态与最后在线时间
    async fn set_status(
        &self,
        user_id: UserId,
        status: PresenceStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<()>;

    /// 当前标记为在线的用户
    async fn online_users(&self) -> DomainResult<Vec<UserSummary>>;
}
