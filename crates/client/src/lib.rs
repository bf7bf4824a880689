//! 客户端重连控制器
//!
//! 断线期间把出站事件放进有界队列，按指数退避重连；重连成功后依次重放队列、
//! 重新加入当前房间，并触发重新同步回调。

pub mod backoff;
pub mod config;
pub mod controller;
pub mod error;
pub mod queue;
pub mod transport;

pub use backoff::Backoff;
pub use config::ReconnectConfig;
pub use controller::{ConnectionState, ReconnectController};
pub use error::{ClientError, TransportError};
pub use queue::{OutboundQueue, QueuedEvent};
pub use transport::{Transport, TransportLink, WebSocketTransport};
