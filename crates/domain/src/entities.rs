//! 核心领域实体
//!
//! 查询对象、跟踪事件、运输商、匹配规则和查询代理的元数据。
//! 这些实体不依赖具体的存储和网络实现。

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{AgentCode, CarrierType, LangId, TrackingResultSrc};

/// 跟踪结果的一个事件。
///
/// 此处的JSON字段名必须和持久化的`events_json`保持一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// 事件的时间。
    pub date: DateTime<Utc>,
    /// 事件的详细描述。
    #[serde(rename = "detail")]
    pub details: String,
    /// 事件发生的地点。
    pub place: String,
    /// 事件的状态。0-未分类 2-未知 3-已妥投 8-投递失败。
    pub state: i32,
}

/// 针对一个运单的查询，同时包含查询条件和查询结果。
#[derive(Debug, Clone)]
pub struct TicketSearch {
    /// 结果来源。可以是DB、API或者爬虫。
    pub src: TrackingResultSrc,
    /// 客户端IP地址。
    pub client_addr: String,
    /// 客户端发来请求的时间。
    pub req_time: DateTime<Utc>,
    /// 查询流水号。
    pub seq_no: String,
    /// 运输商编号。
    pub carrier_code: String,
    /// 需要爬取的语言。
    pub language: LangId,
    /// 运单号。
    pub tracking_no: String,
    /// 最后从查询代理更新的业务时间。
    pub update_time: Option<DateTime<Utc>>,
    /// 查询代理的名字。
    pub agent_name: String,
    /// 启动查询代理的时间。
    pub agent_start_time: Option<DateTime<Utc>>,
    /// 查询代理返回的时间。
    pub agent_end_time: Option<DateTime<Utc>>,
    /// 事件列表，也就是查询代理返回的有效结果。
    pub events: Vec<TrackingEvent>,
    /// 查询代理返回的状态码。
    pub agent_code: AgentCode,
    /// 查询代理发生错误时返回的消息。
    pub err: String,
    /// 查询代理返回的原始文本。
    pub agent_raw_text: String,
    /// 妥投时间。
    pub done_time: Option<DateTime<Utc>>,
    /// 妥投的地点。
    pub done_place: String,
    /// 是否已经妥投。
    pub done: bool,
}

impl TicketSearch {
    pub fn new(
        seq_no: String,
        carrier_code: String,
        language: LangId,
        tracking_no: String,
        req_time: DateTime<Utc>,
        client_addr: String,
    ) -> Self {
        Self {
            src: TrackingResultSrc::Unknown,
            client_addr,
            req_time,
            seq_no,
            carrier_code,
            language,
            tracking_no,
            update_time: None,
            agent_name: String::new(),
            agent_start_time: None,
            agent_end_time: None,
            events: Vec::new(),
            agent_code: AgentCode::Other,
            err: String::new(),
            agent_raw_text: String::new(),
            done_time: None,
            done_place: String::new(),
            done: false,
        }
    }

    /// 判断查询结果是否有效，即查询代理（或数据库）返回了可解析的内容。
    pub fn is_ok(&self) -> bool {
        self.err.is_empty() || self.err == "success"
    }
}

/// 运单号匹配规则。
#[derive(Debug, Clone)]
pub struct TrackingNoRule {
    pub id: i64,
    pub name: String,
    pub code: String,
}

/// 运输商信息。
#[derive(Debug, Clone)]
pub struct Carrier {
    pub id: i64,
    pub code: String,
    pub name_cn: String,
    pub name_en: String,
    pub carrier_type: CarrierType,
    pub country_id: i32,
    pub website_url: Option<String>,
    pub tel: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub service_available: bool,
    pub logo_url: Option<String>,
    pub logo_filename: Option<String>,
    pub tracking_no_rules: Vec<TrackingNoRule>,
}

/// 事件匹配规则。
///
/// `target_type`不等于"4"的规则按查询代理类别匹配，等于"4"的规则
/// 是运输商级别的兜底规则。
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub id: i64,
    pub target_type: String,
    pub content: String,
    /// 规则对应的目标状态代码，比如`Delivered`。
    pub code: String,
    pattern: Option<Regex>,
}

impl MatchRule {
    pub fn new(id: i64, target_type: String, content: String, code: String) -> Self {
        let pattern = if content.is_empty() {
            None
        } else {
            Regex::new(&content).ok()
        };
        Self {
            id,
            target_type,
            content,
            code,
            pattern,
        }
    }

    /// 判断此规则是否匹配目标内容。
    pub fn matches(&self, detail: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|p| p.is_match(detail))
            .unwrap_or(false)
    }
}

/// API查询代理的元数据。
#[derive(Debug, Clone)]
pub struct ApiAgentInfo {
    pub id: i64,
    /// 查询代理名称。
    pub name: String,
    /// 访问查询代理的URL。
    pub url: String,
    /// 1-GET 2-POST。
    pub req_http_type: i32,
}

/// API查询代理的一个参数。
#[derive(Debug, Clone)]
pub struct ApiAgentParam {
    pub field_type: i32,
    pub field_name: String,
    pub field_value: String,
    pub is_head: bool,
    pub is_body: bool,
    pub need_encrypt: bool,
    pub encrypt_type: i32,
}

/// 爬虫查询代理的实现类别。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerKind {
    Python,
    Go,
    Other(String),
}

impl CrawlerKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PYTHON" => CrawlerKind::Python,
            "GO" => CrawlerKind::Go,
            other => CrawlerKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CrawlerKind::Python => "PYTHON",
            CrawlerKind::Go => "GO",
            CrawlerKind::Other(s) => s.as_str(),
        }
    }
}

/// 爬虫查询代理的元数据。
#[derive(Debug, Clone)]
pub struct CrawlerAgentInfo {
    pub id: i64,
    /// 查询代理名称。
    pub name: String,
    /// 访问查询代理的URL。
    pub url: String,
    /// 查询代理类别。
    pub kind: CrawlerKind,
    /// 目标网页的URL。
    pub target_url: String,
    /// 访问目标网页的HTTP Method。
    pub req_http_method: String,
    /// 访问目标网页附带的头部。
    pub req_http_headers: String,
    /// 访问目标网页附带的数据。
    pub req_http_body: String,
    /// 是否需要验证请求结果。
    pub verify: bool,
    /// 是否需要将payload序列化为json。
    pub json: bool,
    /// 代理服务器。
    pub req_proxy: String,
    /// 访问目标网页的超时时间（秒）。
    pub req_timeout: i32,
    /// 目标站点是否加密。0-不加密 1-需要加密。
    pub site_encrypt: i32,
    /// 附加字段名。
    pub tracking_field_name: String,
    /// 附加字段类型。
    pub tracking_field_type: i32,
    pub site_crawling_name: String,
    pub site_analyzed_name: String,
}

/// 保存在数据库中的跟踪结果。
#[derive(Debug, Clone)]
pub struct StoredTrackingResult {
    pub carrier_code: String,
    pub language: LangId,
    pub tracking_no: String,
    /// 事件JSON，也就是之前某次成功查询返回的有效结果。
    pub events_json: String,
    /// 最新的业务更新时间。
    pub update_time: DateTime<Utc>,
    /// 是否已妥投。
    pub done: bool,
}

/// 待写入`tracking_log`的一条审计记录。
#[derive(Debug, Clone)]
pub struct TrackingLogEntry {
    pub carrier_id: i64,
    pub tracking_no: String,
    /// 匹配方式。2表示外部接口指定carrierCode。
    pub match_type: i32,
    pub country_id: i32,
    /// 查询耗时（毫秒）。
    pub timing_ms: i32,
    /// 客户端地址。
    pub host: String,
    /// 1表示查询成功，0表示失败。
    pub result_status: i32,
    pub collector_type: TrackingResultSrc,
    pub operator: String,
    /// 日志写入时间，同时用作统计日期。
    pub created_at: DateTime<Utc>,
    pub request_time: DateTime<Utc>,
    pub agent_start_time: Option<DateTime<Utc>>,
    pub agent_end_time: Option<DateTime<Utc>>,
    pub agent_raw_text: String,
    pub result_note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_rule_regex() {
        let rule = MatchRule::new(1, "1".into(), "Delivered".into(), "Delivered".into());
        assert!(rule.matches("Delivered to recipient"));
        assert!(!rule.matches("In transit"));
    }

    #[test]
    fn test_match_rule_empty_pattern_never_matches() {
        let rule = MatchRule::new(1, "4".into(), "".into(), "Delivered".into());
        assert!(!rule.matches("anything"));
    }

    #[test]
    fn test_crawler_kind_parse() {
        assert_eq!(CrawlerKind::parse("python"), CrawlerKind::Python);
        assert_eq!(CrawlerKind::parse(" GO "), CrawlerKind::Go);
        assert_eq!(
            CrawlerKind::parse("java"),
            CrawlerKind::Other("JAVA".into())
        );
    }

    #[test]
    fn test_tracking_event_json_field_names() {
        let evt = TrackingEvent {
            date: Utc::now(),
            details: "x".into(),
            place: "y".into(),
            state: 0,
        };
        let json = serde_json::to_string(&evt).unwrap();
        assert!(json.contains("\"detail\":\"x\""));
        assert!(json.contains("\"place\":\"y\""));
    }

    #[test]
    fn test_ticket_search_is_ok() {
        let mut ts = TicketSearch::new(
            "1".into(),
            "dhl".into(),
            LangId::En,
            "A1".into(),
            Utc::now(),
            "127.0.0.1".into(),
        );
        assert!(ts.is_ok());
        ts.err = "success".into();
        assert!(ts.is_ok());
        ts.err = "boom".into();
        assert!(!ts.is_ok());
    }
}
