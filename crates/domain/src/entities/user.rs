//! 用户摘要
//!
//! 广播载荷中携带的公开用户信息，不包含任何凭据。

use serde::{Deserialize, Serialize};

use crate::UserId;

/// 用户公开信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl UserSummary {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar: None,
        }
    }
}
