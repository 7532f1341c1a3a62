//! 请求侧的查询调度管线。

pub mod agent_codec;
pub mod freshness;
pub mod matcher;
pub mod persister;
pub mod rendezvous;
pub mod reply;
pub mod service;

pub use freshness::{FreshnessDecision, FreshnessPolicy};
pub use persister::TrackingPersister;
pub use rendezvous::{RendezvousOptions, TicketRendezvous};
pub use reply::{EventReply, OrderReply};
pub use service::{
    dispatch_options, DispatchOptions, OrderQuery, TrackingDispatchService, TrackingsQuery,
    MAX_BATCH_SIZE,
};
