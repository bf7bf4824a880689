//! Redis Pub/Sub 模块
//!
//! 提供跨进程扇出总线：发布者、带重连的订阅者，以及实现 `FanOutBus` 的组合。

pub mod bus;
pub mod error;
pub mod publisher;
pub mod subscriber;

// 重新导出
pub use bus::RedisBus;
pub use error::*;
pub use publisher::*;
pub use subscriber::*;
