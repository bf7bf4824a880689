//! 在线状态与消息扇出核心的领域模型
//!
//! 包含标识、消息/房间/通知实体、客户端与总线事件，以及核心依赖的外部协作者接口。

pub mod entities;
pub mod errors;
pub mod events;
pub mod repositories;
pub mod value_objects;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use events::*;
pub use repositories::*;
pub use value_objects::*;
