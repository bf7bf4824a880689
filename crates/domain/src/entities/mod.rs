//! 领域实体定义
//!
//! 核心只读取或经由协作者创建这些实体，本身不做持久化。

pub mod message;
pub mod notification;
pub mod room;
pub mod user;

// 重新导出核心实体
pub use message::{Message, MessageType, NewMessage, ReadReceipt, MAX_MESSAGE_LENGTH};
pub use notification::{NewNotification, Notification, NotificationData, NotificationKind};
pub use room::Room;
pub use user::UserSummary;
