//! 房间会话管理
//!
//! 维护本进程连接与房间频道之间的订阅关系。加入/离开信号只在本进程内直接通知，
//! 其他进程各自管理自己连接的订阅，不需要知道这里发生了什么。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use domain::{ConnectionId, RoomDirectory, RoomId, ServerEvent, UserSummary};

use crate::error::ApplicationError;
use crate::presence::{ConnectionHandle, PresenceRegistry};

#[derive(Default)]
struct Subscriptions {
    by_room: HashMap<RoomId, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl Subscriptions {
    fn insert(&mut self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let added = self
            .by_connection
            .entry(connection_id)
            .or_default()
            .insert(room_id);
        self.by_room.entry(room_id).or_default().insert(connection_id);
        added
    }

    fn remove(&mut self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        let removed = match self.by_connection.get_mut(&connection_id) {
            Some(rooms) => {
                let removed = rooms.remove(&room_id);
                if rooms.is_empty() {
                    self.by_connection.remove(&connection_id);
                }
                removed
            }
            None => false,
        };
        if let Some(connections) = self.by_room.get_mut(&room_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                self.by_room.remove(&room_id);
            }
        }
        removed
    }

    fn subscribers(&self, room_id: RoomId) -> Vec<ConnectionId> {
        self.by_room
            .get(&room_id)
            .map(|connections| connections.iter().copied().collect())
            .unwrap_or_default()
    }
}

pub struct RoomSessionManager {
    presence: Arc<PresenceRegistry>,
    rooms: Arc<dyn RoomDirectory>,
    subscriptions: RwLock<Subscriptions>,
}

impl RoomSessionManager {
    pub fn new(presence: Arc<PresenceRegistry>, rooms: Arc<dyn RoomDirectory>) -> Self {
        Self {
            presence,
            rooms,
            subscriptions: RwLock::new(Subscriptions::default()),
        }
    }

    /// 订阅房间。房间不存在返回 `NotFound`，非成员返回 `Forbidden`。
    /// 返回 false 表示连接早已订阅，此时不会重复通知。
    pub async fn join(
        &self,
        connection: &ConnectionHandle,
        room_id: RoomId,
    ) -> Result<bool, ApplicationError> {
        let room = self
            .rooms
            .find_room(room_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Room not found"))?;
        if !room.is_member(connection.user_id()) {
            return Err(ApplicationError::forbidden("Not a member of this room"));
        }

        if !self.write().insert(connection.id, room_id) {
            return Ok(false);
        }

        tracing::info!(
            connection_id = %connection.id,
            user_id = %connection.user_id(),
            room_id = %room_id,
            "joined room"
        );
        self.relay_to_room(
            room_id,
            Some(connection.id),
            ServerEvent::UserJoined {
                room_id,
                user: connection.user.clone(),
            },
        );
        Ok(true)
    }

    /// 取消订阅；只有确实订阅过时才通知其他订阅者
    pub fn leave(&self, connection_id: ConnectionId, user: &UserSummary, room_id: RoomId) -> bool {
        if !self.write().remove(connection_id, room_id) {
            return false;
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user.id,
            room_id = %room_id,
            "left room"
        );
        self.relay_to_room(
            room_id,
            Some(connection_id),
            ServerEvent::UserLeft {
                room_id,
                user: user.clone(),
            },
        );
        true
    }

    /// 连接关闭时离开它订阅的全部房间
    pub fn leave_all(&self, connection_id: ConnectionId, user: &UserSummary) -> Vec<RoomId> {
        let rooms = self.rooms_of(connection_id);
        for room_id in &rooms {
            self.leave(connection_id, user, *room_id);
        }
        rooms
    }

    pub fn rooms_of(&self, connection_id: ConnectionId) -> Vec<RoomId> {
        self.read()
            .by_connection
            .get(&connection_id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, connection_id: ConnectionId, room_id: RoomId) -> bool {
        self.read()
            .by_connection
            .get(&connection_id)
            .is_some_and(|rooms| rooms.contains(&room_id))
    }

    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.read().by_room.get(&room_id).map_or(0, HashSet::len)
    }

    /// 投递给本进程订阅该房间的全部连接
    pub fn deliver_to_room(&self, room_id: RoomId, event: ServerEvent) -> usize {
        self.relay_to_room(room_id, None, event)
    }

    /// 投递给本进程订阅该房间的连接，可排除一条连接
    pub fn relay_to_room(
        &self,
        room_id: RoomId,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let subscribers = self.read().subscribers(room_id);

        let delivered = subscribers
            .into_iter()
            .filter(|id| Some(*id) != except)
            .filter(|id| self.presence.send_to_connection(*id, event.clone()))
            .count();
        tracing::debug!(room_id = %room_id, event = event.name(), delivered, "room delivery");
        delivered
    }

    fn read(&self) -> RwLockReadGuard<'_, Subscriptions> {
        self.subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Subscriptions> {
        self.subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
