//! 连接生命周期控制
//!
//! 每条连接的状态机：`Connecting -> Authenticated -> Active -> Closed`。
//! 控制器独占本进程的在线注册表和房间会话，编排限流、持久化协作者和扇出总线。
//! 同一连接的事件按顺序处理；锁只在同步片段内持有，不跨越任何 await。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    BusEnvelope, ClientEvent, Message, MessageId, MessageStore, NewMessage, NewNotification,
    NotificationStore, PresenceStatus, RoomDirectory, RoomId, ServerEvent, UserDirectory, UserId,
    UserSummary,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::{BusError, FanOutBus};
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::presence::{ConnectionHandle, Deregistration, PresenceRegistry};
use crate::rate_limiter::{EventClass, RateDecision, RateLimiter};
use crate::room_session::RoomSessionManager;

/// 握手凭证校验
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// 返回凭证所属用户；无效凭证返回 `ApplicationError::Authentication`
    async fn verify(&self, credential: &str) -> Result<UserId, ApplicationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

/// 一条活跃连接
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    state: ConnectionState,
}

impl Connection {
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn user(&self) -> &UserSummary {
        &self.handle.user
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

pub struct LifecycleDependencies {
    pub rooms: Arc<dyn RoomDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserDirectory>,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub bus: Arc<dyn FanOutBus>,
    pub limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

pub struct ConnectionLifecycleController {
    deps: LifecycleDependencies,
    presence: Arc<PresenceRegistry>,
    sessions: RoomSessionManager,
}

impl ConnectionLifecycleController {
    pub fn new(deps: LifecycleDependencies) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let sessions = RoomSessionManager::new(presence.clone(), deps.rooms.clone());
        Self {
            deps,
            presence,
            sessions,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn sessions(&self) -> &RoomSessionManager {
        &self.sessions
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.deps.limiter
    }

    /// 校验握手凭证并解析用户。失败时不创建任何状态。
    pub async fn authenticate(
        &self,
        credential: Option<&str>,
    ) -> Result<UserSummary, ApplicationError> {
        let credential = credential
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApplicationError::authentication("missing credential"))?;

        let user_id = self.deps.verifier.verify(credential).await?;
        let user = self
            .deps
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| ApplicationError::authentication("unknown user"))?;

        tracing::debug!(user_id = %user.id, "credential accepted");
        Ok(user)
    }

    /// 已认证用户进入 Active：登记连接、标记在线、发布在线事件、推送在线用户快照
    pub async fn activate(
        &self,
        user: UserSummary,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Connection {
        let handle = ConnectionHandle::new(user, outbound);
        let user_id = handle.user_id();
        let local_connections = self.presence.register(handle.clone());
        tracing::info!(
            connection_id = %handle.id,
            user_id = %user_id,
            local_connections,
            "connection active"
        );

        self.announce_presence(user_id, PresenceStatus::Online).await;

        match self.deps.users.online_users().await {
            Ok(online) => {
                handle.send(ServerEvent::OnlineUsers(online));
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "failed to load online users")
            }
        }

        Connection {
            handle,
            state: ConnectionState::Active,
        }
    }

    pub async fn connect(
        &self,
        credential: Option<&str>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<Connection, ApplicationError> {
        let user = self.authenticate(credential).await?;
        Ok(self.activate(user, outbound).await)
    }

    /// 传输关闭时调用，无论之前哪一步失败。重复调用无效果。
    pub async fn close(&self, connection: &mut Connection) {
        if connection.state == ConnectionState::Closed {
            return;
        }
        connection.state = ConnectionState::Closed;

        let handle = &connection.handle;
        let left = self.sessions.leave_all(handle.id, &handle.user);
        let outcome = self.presence.deregister(handle.id);
        tracing::info!(
            connection_id = %handle.id,
            user_id = %handle.user_id(),
            rooms_left = left.len(),
            "connection closed"
        );

        if outcome == Deregistration::LastConnection {
            self.announce_presence(handle.user_id(), PresenceStatus::Offline)
                .await;
        }
    }

    /// 处理一条入站事件，错误只回送给触发者
    pub async fn handle_event(&self, connection: &Connection, event: ClientEvent) {
        let name = event.name();
        if let Err(err) = self.dispatch(connection, event).await {
            match &err {
                ApplicationError::RateLimited { .. } => {}
                err if err.is_transient() => {
                    tracing::error!(
                        connection_id = %connection.handle.id,
                        event = name,
                        error = %err,
                        "event failed"
                    )
                }
                err => {
                    tracing::debug!(
                        connection_id = %connection.handle.id,
                        event = name,
                        error = %err,
                        "event rejected"
                    )
                }
            }
            if let Some(reply) = err.to_client_event() {
                connection.handle.send(reply);
            }
        }
    }

    pub async fn dispatch(
        &self,
        connection: &Connection,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        if connection.state != ConnectionState::Active {
            return Ok(());
        }
        let handle = &connection.handle;

        match event {
            ClientEvent::JoinRoom { room_id } => {
                self.sessions.join(handle, room_id).await?;
            }
            ClientEvent::LeaveRoom { room_id } => {
                self.sessions.leave(handle.id, &handle.user, room_id);
            }
            ClientEvent::SendMessage {
                room_id,
                content,
                reply_to,
            } => {
                self.send_message(handle, room_id, content, reply_to)
                    .await?;
            }
            ClientEvent::TypingStart { room_id } => self.typing(handle, room_id, true),
            ClientEvent::TypingStop { room_id } => self.typing(handle, room_id, false),
            ClientEvent::MessageRead { message_id } => {
                self.mark_read(handle, message_id).await?;
            }
        }
        Ok(())
    }

    /// 消息发送主路径。持久化成功后的步骤失败不回滚，只丢失对应的广播。
    pub async fn send_message(
        &self,
        handle: &ConnectionHandle,
        room_id: RoomId,
        content: String,
        reply_to: Option<MessageId>,
    ) -> Result<Message, ApplicationError> {
        let user_id = handle.user_id();
        if let RateDecision::Rejected { retry_after_secs } = self
            .deps
            .limiter
            .check_and_consume(user_id, EventClass::Message)
        {
            tracing::warn!(user_id = %user_id, retry_after_secs, "message rate limit exceeded");
            return Err(ApplicationError::RateLimited { retry_after_secs });
        }

        let room = self
            .deps
            .rooms
            .find_room(room_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Room not found"))?;
        if !room.is_member(user_id) {
            return Err(ApplicationError::forbidden("Not a member of this room"));
        }

        let draft = NewMessage::text(room_id, user_id, content, reply_to)?;
        let message = self.deps.messages.create_message(draft).await?;

        if let Err(err) = self
            .deps
            .rooms
            .touch_activity(room_id, self.deps.clock.now())
            .await
        {
            tracing::error!(room_id = %room_id, error = %err, "failed to update room activity");
        }

        self.publish(BusEnvelope::RoomMessage {
            room_id,
            message: message.clone(),
        })
        .await;

        for member in room.other_members(user_id) {
            let draft = NewNotification::for_message(member, &room, &message);
            match self.deps.notifications.create_notification(draft).await {
                Ok(notification) => {
                    self.publish(BusEnvelope::UserNotification {
                        user_id: member,
                        notification,
                    })
                    .await;
                }
                Err(err) => {
                    tracing::error!(
                        user_id = %member,
                        error = %err,
                        "failed to create notification"
                    )
                }
            }
        }

        tracing::info!(
            message_id = %message.id,
            room_id = %room_id,
            user_id = %user_id,
            "message sent"
        );
        Ok(message)
    }

    /// 输入状态只在本进程内转发给同房间的其他订阅者
    fn typing(&self, handle: &ConnectionHandle, room_id: RoomId, typing: bool) {
        if typing
            && !self
                .deps
                .limiter
                .check_and_consume(handle.user_id(), EventClass::Typing)
                .is_allowed()
        {
            tracing::debug!(user_id = %handle.user_id(), "typing indicator dropped by rate limit");
            return;
        }
        if !self.sessions.is_subscribed(handle.id, room_id) {
            return;
        }
        self.sessions.relay_to_room(
            room_id,
            Some(handle.id),
            ServerEvent::UserTyping {
                room_id,
                user: handle.user.clone(),
                typing,
            },
        );
    }

    pub async fn mark_read(
        &self,
        handle: &ConnectionHandle,
        message_id: MessageId,
    ) -> Result<Message, ApplicationError> {
        let user_id = handle.user_id();
        let message = self
            .deps
            .messages
            .mark_read(message_id, user_id, self.deps.clock.now())
            .await?
            .ok_or_else(|| ApplicationError::not_found("Message not found"))?;

        self.publish(BusEnvelope::ReadReceipt {
            room_id: message.room_id,
            message_id,
            user_id,
        })
        .await;
        Ok(message)
    }

    /// 本进程收到总线事件后的本地投递
    pub fn deliver(&self, envelope: BusEnvelope) -> usize {
        match envelope {
            BusEnvelope::RoomMessage { room_id, message } => self
                .sessions
                .deliver_to_room(room_id, ServerEvent::NewMessage(message)),
            BusEnvelope::ReadReceipt {
                room_id,
                message_id,
                user_id,
            } => self.sessions.deliver_to_room(
                room_id,
                ServerEvent::MessageRead {
                    message_id,
                    user_id,
                },
            ),
            BusEnvelope::PresenceChanged {
                user_id,
                status,
                timestamp,
            } => self.presence.broadcast(&ServerEvent::PresenceStatus {
                user_id,
                status,
                timestamp,
            }),
            BusEnvelope::UserNotification {
                user_id,
                notification,
            } => self
                .presence
                .send_to_user(user_id, &ServerEvent::Notification(notification)),
        }
    }

    /// 订阅总线并持续本地投递，直到总线关闭
    pub async fn start_fanout(self: Arc<Self>) -> Result<JoinHandle<()>, BusError> {
        let mut subscription = self.deps.bus.subscribe().await?;
        Ok(tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                self.deliver(envelope);
            }
            tracing::warn!("fan-out subscription ended");
        }))
    }

    async fn announce_presence(&self, user_id: UserId, status: PresenceStatus) {
        let timestamp = self.deps.clock.now();
        if let Err(err) = self.deps.users.set_status(user_id, status, timestamp).await {
            tracing::error!(
                user_id = %user_id,
                %status,
                error = %err,
                "failed to persist presence"
            );
        }
        self.publish(BusEnvelope::PresenceChanged {
            user_id,
            status,
            timestamp,
        })
        .await;
    }

    async fn publish(&self, envelope: BusEnvelope) {
        let channel = envelope.channel();
        if let Err(err) = self.deps.bus.publish(envelope).await {
            tracing::error!(?channel, error = %err, "broadcast lost");
        }
    }
}
