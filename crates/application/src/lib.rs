//! 应用层实现。
//!
//! 在线状态与消息扇出核心：限流、进程内在线注册表、房间会话、
//! 扇出总线契约，以及编排它们的连接生命周期控制器。

pub mod bus;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod local_bus;
pub mod presence;
pub mod rate_limiter;
pub mod room_session;

pub use bus::{BusError, BusSubscription, FanOutBus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ApplicationError;
pub use lifecycle::{
    Connection, ConnectionLifecycleController, ConnectionState, CredentialVerifier,
    LifecycleDependencies,
};
pub use local_bus::InMemoryBus;
pub use presence::{ConnectionHandle, Deregistration, PresenceRegistry};
pub use rate_limiter::{EventClass, RateDecision, RateLimiter, RateLimiterStats, WindowPolicy};
pub use room_session::RoomSessionManager;
