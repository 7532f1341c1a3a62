//! 测试辅助：仓储mock和数据构造器。

pub mod builders;
pub mod mocks;

pub use mocks::{
    MockAgentRepository, MockCarrierRepository, MockMatchRuleRepository,
    MockTrackingLogRepository, MockTrackingResultRepository,
};
