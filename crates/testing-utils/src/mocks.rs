//! 仓储接口的内存mock实现。
//!
//! 单元测试和集成测试使用这些实现，不需要真实的数据库连接。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tracking_common::sign::md5_hex;
use tracking_domain::types::{LangId, TrackingResultSrc};
use tracking_domain::{
    AgentRepository, ApiAgentInfo, ApiAgentParam, Carrier, CarrierRepository, CrawlerAgentInfo,
    MatchRule, MatchRuleRepository, StoredTrackingResult, TrackingEvent, TrackingLogEntry,
    TrackingLogRepository, TrackingResultRepository,
};
use tracking_errors::TrackingResult;

/// 运输商仓储mock。
#[derive(Debug, Clone, Default)]
pub struct MockCarrierRepository {
    carriers: Arc<Mutex<Vec<Carrier>>>,
}

impl MockCarrierRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_carriers(carriers: Vec<Carrier>) -> Self {
        Self {
            carriers: Arc::new(Mutex::new(carriers)),
        }
    }

    pub fn add(&self, carrier: Carrier) {
        self.carriers.lock().unwrap().push(carrier);
    }
}

#[async_trait]
impl CarrierRepository for MockCarrierRepository {
    async fn find_by_code(&self, carrier_code: &str) -> TrackingResult<Option<Carrier>> {
        let carriers = self.carriers.lock().unwrap();
        Ok(carriers.iter().find(|c| c.code == carrier_code).cloned())
    }

    async fn find_all(&self) -> TrackingResult<Vec<Carrier>> {
        Ok(self.carriers.lock().unwrap().clone())
    }
}

/// 查询代理元数据仓储mock。
#[derive(Debug, Clone, Default)]
pub struct MockAgentRepository {
    api_agent: Arc<Mutex<Option<ApiAgentInfo>>>,
    api_params: Arc<Mutex<Vec<ApiAgentParam>>>,
    crawler_agent: Arc<Mutex<Option<CrawlerAgentInfo>>>,
}

impl MockAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_api_agent(&self, agent: ApiAgentInfo, params: Vec<ApiAgentParam>) {
        *self.api_agent.lock().unwrap() = Some(agent);
        *self.api_params.lock().unwrap() = params;
    }

    pub fn set_crawler_agent(&self, agent: CrawlerAgentInfo) {
        *self.crawler_agent.lock().unwrap() = Some(agent);
    }

    pub fn clear(&self) {
        *self.api_agent.lock().unwrap() = None;
        self.api_params.lock().unwrap().clear();
        *self.crawler_agent.lock().unwrap() = None;
    }
}

#[async_trait]
impl AgentRepository for MockAgentRepository {
    async fn find_api_agent(
        &self,
        _carrier_code: &str,
        _at: DateTime<Utc>,
    ) -> TrackingResult<Option<ApiAgentInfo>> {
        Ok(self.api_agent.lock().unwrap().clone())
    }

    async fn find_api_params(&self, _api_id: i64) -> TrackingResult<Vec<ApiAgentParam>> {
        Ok(self.api_params.lock().unwrap().clone())
    }

    async fn find_crawler_agent(
        &self,
        _carrier_code: &str,
        _at: DateTime<Utc>,
    ) -> TrackingResult<Option<CrawlerAgentInfo>> {
        Ok(self.crawler_agent.lock().unwrap().clone())
    }
}

/// 匹配规则仓储mock。
#[derive(Debug, Clone, Default)]
pub struct MockMatchRuleRepository {
    rules: Arc<Mutex<Vec<MatchRule>>>,
}

impl MockMatchRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<MatchRule>) -> Self {
        Self {
            rules: Arc::new(Mutex::new(rules)),
        }
    }
}

#[async_trait]
impl MatchRuleRepository for MockMatchRuleRepository {
    async fn find_by_carrier(
        &self,
        _carrier_code: &str,
        _at: DateTime<Utc>,
    ) -> TrackingResult<Vec<MatchRule>> {
        Ok(self.rules.lock().unwrap().clone())
    }
}

/// 已保存的一条跟踪结果（用于断言）。
#[derive(Debug, Clone)]
pub struct SavedTrackingResult {
    pub carrier_id: i64,
    pub language: LangId,
    pub tracking_no: String,
    pub events_json: String,
    pub done: bool,
}

/// 已保存的一条跟踪明细（用于断言）。
#[derive(Debug, Clone)]
pub struct SavedTrackingDetail {
    pub tracking_id: i64,
    pub event: TrackingEvent,
}

/// 跟踪结果仓储mock。去重语义和数据库实现一致。
#[derive(Debug, Clone, Default)]
pub struct MockTrackingResultRepository {
    stored: Arc<Mutex<HashMap<(String, i32, String), StoredTrackingResult>>>,
    dedup: Arc<Mutex<HashSet<(i64, i32, String, String)>>>,
    saved_results: Arc<Mutex<Vec<SavedTrackingResult>>>,
    saved_details: Arc<Mutex<Vec<SavedTrackingDetail>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockTrackingResultRepository {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(Mutex::new(1)),
            ..Self::default()
        }
    }

    /// 预置一条数据库中的跟踪结果。
    pub fn seed(&self, result: StoredTrackingResult) {
        let key = (
            result.carrier_code.clone(),
            result.language.value(),
            result.tracking_no.clone(),
        );
        self.stored.lock().unwrap().insert(key, result);
    }

    pub fn saved_results(&self) -> Vec<SavedTrackingResult> {
        self.saved_results.lock().unwrap().clone()
    }

    pub fn saved_details(&self) -> Vec<SavedTrackingDetail> {
        self.saved_details.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingResultRepository for MockTrackingResultRepository {
    async fn find_latest(
        &self,
        carrier_code: &str,
        language: LangId,
        tracking_no: &str,
    ) -> TrackingResult<Option<StoredTrackingResult>> {
        let key = (
            carrier_code.to_string(),
            language.value(),
            tracking_no.to_string(),
        );
        Ok(self.stored.lock().unwrap().get(&key).cloned())
    }

    async fn save_result(
        &self,
        carrier_id: i64,
        language: LangId,
        tracking_no: &str,
        events_json: &str,
        _at: DateTime<Utc>,
        done: bool,
    ) -> TrackingResult<Option<i64>> {
        let fingerprint = (
            carrier_id,
            language.value(),
            tracking_no.to_string(),
            md5_hex(events_json),
        );
        if !self.dedup.lock().unwrap().insert(fingerprint) {
            return Ok(None);
        }

        self.saved_results.lock().unwrap().push(SavedTrackingResult {
            carrier_id,
            language,
            tracking_no: tracking_no.to_string(),
            events_json: events_json.to_string(),
            done,
        });

        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        Ok(Some(id))
    }

    async fn save_tracking(
        &self,
        _carrier_id: i64,
        _language: LangId,
        _tracking_no: &str,
        _delivery_time: Option<DateTime<Utc>>,
        _destination: &str,
        _collector_type: TrackingResultSrc,
        _collector_real_name: &str,
        _at: DateTime<Utc>,
    ) -> TrackingResult<i64> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        Ok(id)
    }

    async fn save_detail(
        &self,
        tracking_id: i64,
        event: &TrackingEvent,
        _at: DateTime<Utc>,
    ) -> TrackingResult<i64> {
        self.saved_details.lock().unwrap().push(SavedTrackingDetail {
            tracking_id,
            event: event.clone(),
        });

        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        Ok(id)
    }
}

/// 审计日志仓储mock。
#[derive(Debug, Clone, Default)]
pub struct MockTrackingLogRepository {
    logs: Arc<Mutex<Vec<TrackingLogEntry>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockTrackingLogRepository {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(Mutex::new(1)),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<TrackingLogEntry> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingLogRepository for MockTrackingLogRepository {
    async fn save_log(&self, entry: &TrackingLogEntry) -> TrackingResult<i64> {
        self.logs.lock().unwrap().push(entry.clone());
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        Ok(id)
    }
}
