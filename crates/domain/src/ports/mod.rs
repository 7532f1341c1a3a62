pub mod rendezvous;
pub mod repositories;

pub use rendezvous::{TicketQueue, TicketStore};
pub use repositories::{
    AgentRepository, CarrierRepository, MatchRuleRepository, TrackingLogRepository,
    TrackingResultRepository,
};
