//! 数据访问抽象
//!
//! 定义运输商、匹配规则、查询代理元数据和跟踪结果的仓储接口，
//! 遵循依赖倒置原则，测试中以内存实现替换。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracking_errors::TrackingResult;

use crate::entities::{
    ApiAgentInfo, ApiAgentParam, Carrier, CrawlerAgentInfo, MatchRule, StoredTrackingResult,
    TrackingEvent, TrackingLogEntry,
};
use crate::types::{LangId, TrackingResultSrc};

/// 运输商仓储。
#[async_trait]
pub trait CarrierRepository: Send + Sync {
    /// 根据运输商编号查询运输商。不存在时返回`None`。
    async fn find_by_code(&self, carrier_code: &str) -> TrackingResult<Option<Carrier>>;

    /// 查询全部有效运输商，包含关联的运单号规则。
    async fn find_all(&self) -> TrackingResult<Vec<Carrier>>;
}

/// 查询代理元数据仓储。
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// 查询指定运输商在指定时间点有效的API查询代理。
    async fn find_api_agent(
        &self,
        carrier_code: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<Option<ApiAgentInfo>>;

    /// 查询API查询代理的参数，按sort排序。
    async fn find_api_params(&self, api_id: i64) -> TrackingResult<Vec<ApiAgentParam>>;

    /// 查询指定运输商在指定时间点有效的爬虫查询代理，按priority取第一个。
    async fn find_crawler_agent(
        &self,
        carrier_code: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<Option<CrawlerAgentInfo>>;
}

/// 事件匹配规则仓储。
#[async_trait]
pub trait MatchRuleRepository: Send + Sync {
    /// 查询指定运输商在指定时间点有效的匹配规则，按规则ID排序。
    async fn find_by_carrier(
        &self,
        carrier_code: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<Vec<MatchRule>>;
}

/// 跟踪结果仓储。
#[async_trait]
pub trait TrackingResultRepository: Send + Sync {
    /// 根据运输商编号、语言和运单号查询已存在的跟踪结果。
    async fn find_latest(
        &self,
        carrier_code: &str,
        language: LangId,
        tracking_no: &str,
    ) -> TrackingResult<Option<StoredTrackingResult>>;

    /// 保存跟踪结果。以(carrier, language, tracking_no, md5)做去重，
    /// 已存在同样的记录时放弃保存并返回`None`，否则返回新记录的ID。
    #[allow(clippy::too_many_arguments)]
    async fn save_result(
        &self,
        carrier_id: i64,
        language: LangId,
        tracking_no: &str,
        events_json: &str,
        at: DateTime<Utc>,
        done: bool,
    ) -> TrackingResult<Option<i64>>;

    /// 保存跟踪主记录，返回新记录的ID。
    #[allow(clippy::too_many_arguments)]
    async fn save_tracking(
        &self,
        carrier_id: i64,
        language: LangId,
        tracking_no: &str,
        delivery_time: Option<DateTime<Utc>>,
        destination: &str,
        collector_type: TrackingResultSrc,
        collector_real_name: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<i64>;

    /// 保存跟踪明细（一个事件一条）。
    async fn save_detail(
        &self,
        tracking_id: i64,
        event: &TrackingEvent,
        at: DateTime<Utc>,
    ) -> TrackingResult<i64>;
}

/// 查询审计日志仓储。
#[async_trait]
pub trait TrackingLogRepository: Send + Sync {
    async fn save_log(&self, entry: &TrackingLogEntry) -> TrackingResult<i64>;
}
