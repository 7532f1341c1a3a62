//! 基础设施层：共享缓存、优先级队列和MySQL仓储的具体实现。

pub mod database;
pub mod memory;
pub mod redis_queue;
pub mod redis_store;

pub use memory::{InMemoryTicketQueue, InMemoryTicketStore};
pub use redis_queue::RedisTicketQueue;
pub use redis_store::RedisTicketStore;
