//! 聊天室实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomId, UserId};

/// 房间目录返回的聊天室视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// 房间成员（包含离线成员）
    pub members: Vec<UserId>,
    pub last_activity: DateTime<Utc>,
}

impl Room {
    pub fn new(name: impl Into<String>, members: Vec<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            id: RoomId::new(),
            name: name.into(),
            members,
            last_activity: now,
        }
    }

    /// 检查用户是否为房间成员
    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }

    /// 除指定用户外的其他成员
    pub fn other_members(&self, user_id: UserId) -> impl Iterator<Item = UserId> + '_ {
        self.members.iter().copied().filter(move |member| *member != user_id)
    }
}
