//! 内存文档存储
//!
//! 为本地开发和测试实现全部外部协作者接口：房间目录、消息/通知存储、用户目录。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use application::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    DomainError, DomainResult, Message, MessageId, MessageStore, NewMessage, NewNotification,
    Notification, NotificationStore, PresenceStatus, Room, RoomDirectory, RoomId, UserDirectory,
    UserId, UserSummary,
};

#[derive(Debug, Clone)]
struct StoredUser {
    summary: UserSummary,
    status: PresenceStatus,
    last_seen: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Documents {
    users: HashMap<UserId, StoredUser>,
    rooms: HashMap<RoomId, Room>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    create_calls: Vec<NewMessage>,
}

/// 演示数据
#[derive(Debug, Clone)]
pub struct DemoSeed {
    pub users: Vec<UserSummary>,
    pub room: Room,
}

#[derive(Clone)]
pub struct MemoryStore {
    documents: Arc<RwLock<Documents>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            documents: Arc::new(RwLock::new(Documents::default())),
            clock,
        }
    }

    pub fn add_user(&self, username: impl Into<String>) -> UserSummary {
        let summary = UserSummary::new(UserId::new(), username);
        self.write().users.insert(
            summary.id,
            StoredUser {
                summary: summary.clone(),
                status: PresenceStatus::Offline,
                last_seen: None,
            },
        );
        summary
    }

    pub fn add_room(&self, name: impl Into<String>, members: &[UserId]) -> Room {
        let room = Room::new(name, members.to_vec(), self.clock.now());
        self.write().rooms.insert(room.id, room.clone());
        room
    }

    /// 写入三个用户和一个共同房间
    pub fn seed_demo(&self) -> DemoSeed {
        let users: Vec<UserSummary> = ["alice", "bob", "carol"]
            .into_iter()
            .map(|name| self.add_user(name))
            .collect();
        let members: Vec<UserId> = users.iter().map(|user| user.id).collect();
        let room = self.add_room("general", &members);
        DemoSeed { users, room }
    }

    pub fn room(&self, room_id: RoomId) -> Option<Room> {
        self.read().rooms.get(&room_id).cloned()
    }

    pub fn message(&self, message_id: MessageId) -> Option<Message> {
        self.read()
            .messages
            .iter()
            .find(|message| message.id == message_id)
            .cloned()
    }

    /// 收到过的消息创建请求，按调用顺序
    pub fn created_messages(&self) -> Vec<NewMessage> {
        self.read().create_calls.clone()
    }

    pub fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
        self.read()
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn status_of(&self, user_id: UserId) -> Option<(PresenceStatus, Option<DateTime<Utc>>)> {
        self.read()
            .users
            .get(&user_id)
            .map(|user| (user.status, user.last_seen))
    }

    fn read(&self) -> RwLockReadGuard<'_, Documents> {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Documents> {
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomDirectory for MemoryStore {
    async fn find_room(&self, room_id: RoomId) -> DomainResult<Option<Room>> {
        Ok(self.room(room_id))
    }

    async fn touch_activity(&self, room_id: RoomId, at: DateTime<Utc>) -> DomainResult<()> {
        let mut documents = self.write();
        let room = documents
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| DomainError::not_found("Room", room_id))?;
        room.last_activity = at;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, draft: NewMessage) -> DomainResult<Message> {
        let created_at = self.clock.now();
        let mut documents = self.write();
        documents.create_calls.push(draft.clone());

        let sender = documents
            .users
            .get(&draft.sender_id)
            .map(|user| user.summary.clone())
            .ok_or_else(|| DomainError::not_found("User", draft.sender_id))?;
        let message = Message::from_new(draft, sender, created_at);
        documents.messages.push(message.clone());
        Ok(message)
    }

    async fn mark_read(
        &self,
        message_id: MessageId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<Message>> {
        let mut documents = self.write();
        Ok(documents
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)
            .map(|message| {
                message.mark_read(user_id, at);
                message.clone()
            }))
    }

    async fn recent_messages(&self, room_id: RoomId, limit: usize) -> DomainResult<Vec<Message>> {
        let documents = self.read();
        let in_room: Vec<&Message> = documents
            .messages
            .iter()
            .filter(|message| message.room_id == room_id)
            .collect();
        let skip = in_room.len().saturating_sub(limit);
        Ok(in_room.into_iter().skip(skip).cloned().collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(&self, draft: NewNotification) -> DomainResult<Notification> {
        let notification = Notification::from_new(draft, self.clock.now());
        self.write().notifications.push(notification.clone());
        Ok(notification)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: UserId) -> DomainResult<Option<UserSummary>> {
        Ok(self.read().users.get(&user_id).map(|user| user.summary.clone()))
    }

    async fn set_status(
        &self,
        user_id: UserId,
        status: PresenceStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut documents = self.write();
        let user = documents
            .users
            .get_mut(&user_id)
            .ok_or_else(|| DomainError::not_found("User", user_id))?;
        user.status = status;
        user.last_seen = Some(at);
        Ok(())
    }

    async fn online_users(&self) -> DomainResult<Vec<UserSummary>> {
        let mut online: Vec<UserSummary> = self
            .read()
            .users
            .values()
            .filter(|user| user.status == PresenceStatus::Online)
            .map(|user| user.summary.clone())
            .collect();
        online.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::MessageType;

    #[tokio::test]
    async fn create_message_populates_sender() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice");
        let room = store.add_room("general", &[alice.id]);

        let draft = NewMessage::text(room.id, alice.id, "hello", None).unwrap();
        let message = store.create_message(draft.clone()).await.unwrap();

        assert_eq!(message.sender, alice);
        assert_eq!(message.message_type, MessageType::Text);
        assert_eq!(store.created_messages(), vec![draft]);
    }

    #[tokio::test]
    async fn marking_read_twice_keeps_one_receipt() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice");
        let bob = store.add_user("bob");
        let room = store.add_room("general", &[alice.id, bob.id]);
        let draft = NewMessage::text(room.id, alice.id, "hello", None).unwrap();
        let message = store.create_message(draft).await.unwrap();

        store.mark_read(message.id, bob.id, Utc::now()).await.unwrap();
        let updated = store
            .mark_read(message.id, bob.id, Utc::now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.read_by.len(), 1);
        assert!(store
            .mark_read(MessageId::new(), bob.id, Utc::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn recent_messages_returns_latest_in_order() {
        let store = MemoryStore::new();
        let alice = store.add_user("alice");
        let room = store.add_room("general", &[alice.id]);
        let other = store.add_room("other", &[alice.id]);

        for i in 0..5 {
            let draft = NewMessage::text(room.id, alice.id, format!("m{i}"), None).unwrap();
            store.create_message(draft).await.unwrap();
        }
        let draft = NewMessage::text(other.id, alice.id, "elsewhere", None).unwrap();
        store.create_message(draft).await.unwrap();

        let recent = store.recent_messages(room.id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn online_users_reflect_status() {
        let store = MemoryStore::new();
        let seed = store.seed_demo();
        let bob = seed.users[1].clone();

        store
            .set_status(bob.id, PresenceStatus::Online, Utc::now())
            .await
            .unwrap();

        assert_eq!(store.online_users().await.unwrap(), vec![bob.clone()]);
        assert_eq!(
            store.status_of(bob.id).map(|(status, _)| status),
            Some(PresenceStatus::Online)
        );
        assert!(store
            .set_status(UserId::new(), PresenceStatus::Online, Utc::now())
            .await
            .is_err());
    }
}
