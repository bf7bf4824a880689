//! 事件定义
//!
//! - `client`：客户端与服务端之间双向通道上的事件
//! - `bus`：进程之间经由共享发布订阅总线传递的事件

pub mod bus;
pub mod client;

pub use bus::{BusChannel, BusEnvelope};
pub use client::{ClientEvent, ServerEvent};
