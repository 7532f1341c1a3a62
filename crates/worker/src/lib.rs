//! 查询代理侧：轮询池和代理调用。

pub mod invoker;
pub mod pool;

pub use invoker::{AgentInvoker, InvokerOptions};
pub use pool::{AgentPollingPool, PoolOptions, TicketHandler};
