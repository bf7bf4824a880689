//! 在线状态注册表
//!
//! 进程内的 `用户 -> 连接集合` 映射。只反映本进程持有的连接，
//! 跨进程的可见性由总线扇出保证，注册表本身从不复制到其他进程。

use std::collections::HashMap;
use std::sync::RwLock;

use domain::{ConnectionId, ServerEvent, UserId, UserSummary};
use tokio::sync::mpsc;

/// 一条已认证连接的出站句柄
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: UserSummary,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user: UserSummary, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            user,
            outbound,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    /// 推送事件，连接已关闭时返回 false
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.send(event).is_ok()
    }
}

/// 注销结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deregistration {
    /// 这是该用户在本进程的最后一条连接
    LastConnection,
    /// 该用户仍有其他连接
    Remaining(usize),
    /// 连接不在注册表中（重复关闭）
    Unknown,
}

#[derive(Default)]
struct Entries {
    by_user: HashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>,
    owners: HashMap<ConnectionId, UserId>,
}

#[derive(Default)]
pub struct PresenceRegistry {
    entries: RwLock<Entries>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记连接，返回该用户当前的连接数
    pub fn register(&self, handle: ConnectionHandle) -> usize {
        let mut entries = self.write();
        let user_id = handle.user_id();
        entries.owners.insert(handle.id, user_id);
        let connections = entries.by_user.entry(user_id).or_default();
        connections.insert(handle.id, handle);
        connections.len()
    }

    pub fn deregister(&self, connection_id: ConnectionId) -> Deregistration {
        let mut entries = self.write();
        let Some(user_id) = entries.owners.remove(&connection_id) else {
            return Deregistration::Unknown;
        };

        let remaining = match entries.by_user.get_mut(&user_id) {
            Some(connections) => {
                connections.remove(&connection_id);
                connections.len()
            }
            None => 0,
        };
        if remaining == 0 {
            entries.by_user.remove(&user_id);
            Deregistration::LastConnection
        } else {
            Deregistration::Remaining(remaining)
        }
    }

    pub fn connection(&self, connection_id: ConnectionId) -> Option<ConnectionHandle> {
        let entries = self.read();
        let user_id = entries.owners.get(&connection_id)?;
        entries.by_user.get(user_id)?.get(&connection_id).cloned()
    }

    pub fn connections_of(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        self.read()
            .by_user
            .get(&user_id)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 用户在本进程是否在线
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.read().by_user.contains_key(&user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.read().owners.len()
    }

    /// 推送给用户在本进程的所有连接，返回送达数量
    pub fn send_to_user(&self, user_id: UserId, event: &ServerEvent) -> usize {
        self.connections_of(user_id)
            .into_iter()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    pub fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.connection(connection_id)
            .map(|handle| handle.send(event))
            .unwrap_or(false)
    }

    /// 推送给本进程的全部连接
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let handles: Vec<ConnectionHandle> = self
            .read()
            .by_user
            .values()
            .flat_map(|connections| connections.values().cloned())
            .collect();
        handles
            .into_iter()
            .filter(|handle| handle.send(event.clone()))
            .count()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Entries> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
