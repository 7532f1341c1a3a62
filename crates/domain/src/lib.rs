//! 运单跟踪查询的领域层：实体、枚举和端口抽象。

pub mod entities;
pub mod ports;
pub mod types;

pub use entities::{
    ApiAgentInfo, ApiAgentParam, Carrier, CrawlerAgentInfo, CrawlerKind, MatchRule,
    StoredTrackingResult, TicketSearch, TrackingEvent, TrackingLogEntry, TrackingNoRule,
};
pub use ports::rendezvous::{
    queue_topic, seq_no_of_key, ticket_key, TicketQueue, TicketStore,
};
pub use ports::repositories::{
    AgentRepository, CarrierRepository, MatchRuleRepository, TrackingLogRepository,
    TrackingResultRepository,
};
pub use types::{
    AgentCode, CarrierType, LangId, Priority, TicketStatus, TrackingResultSrc, ALL_PRIORITIES,
};
