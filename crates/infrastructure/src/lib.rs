//! 基础设施层实现。
//!
//! 提供 Redis 扇出总线和内存文档存储，实现应用/领域层定义的接口。

pub mod builder;
pub mod memory_store;
pub mod redis;

pub use builder::{build_bus, InfrastructureError};
pub use memory_store::{DemoSeed, MemoryStore};
pub use self::redis::{RedisBus, RedisPublisher, RedisSubscriber, SubscriberSettings};
