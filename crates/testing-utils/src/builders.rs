//! 测试数据的构造辅助。

use chrono::{DateTime, Utc};

use tracking_domain::types::{CarrierType, LangId};
use tracking_domain::{
    ApiAgentInfo, ApiAgentParam, Carrier, CrawlerAgentInfo, CrawlerKind, MatchRule,
    StoredTrackingResult, TrackingEvent,
};

/// 构造一个最小的运输商。
pub fn carrier(id: i64, code: &str) -> Carrier {
    Carrier {
        id,
        code: code.to_string(),
        name_cn: format!("{code}运输"),
        name_en: code.to_uppercase(),
        carrier_type: CarrierType::International,
        country_id: 1,
        website_url: None,
        tel: None,
        email: None,
        description: None,
        service_available: true,
        logo_url: None,
        logo_filename: None,
        tracking_no_rules: Vec::new(),
    }
}

/// 构造一条查询代理类别的妥投规则。
pub fn delivered_rule(id: i64, pattern: &str) -> MatchRule {
    MatchRule::new(id, "1".to_string(), pattern.to_string(), "Delivered".to_string())
}

/// 构造一个跟踪事件。
pub fn event(date: DateTime<Utc>, details: &str, place: &str) -> TrackingEvent {
    TrackingEvent {
        date,
        details: details.to_string(),
        place: place.to_string(),
        state: 0,
    }
}

/// 构造一条数据库中的跟踪结果。
pub fn stored_result(
    carrier_code: &str,
    language: LangId,
    tracking_no: &str,
    events: &[TrackingEvent],
    update_time: DateTime<Utc>,
    done: bool,
) -> StoredTrackingResult {
    let events_json = if events.is_empty() {
        String::new()
    } else {
        serde_json::to_string(events).expect("events serialize")
    };
    StoredTrackingResult {
        carrier_code: carrier_code.to_string(),
        language,
        tracking_no: tracking_no.to_string(),
        events_json,
        update_time,
        done,
    }
}

/// 构造一个API查询代理。
pub fn api_agent(id: i64, name: &str, url: &str) -> ApiAgentInfo {
    ApiAgentInfo {
        id,
        name: name.to_string(),
        url: url.to_string(),
        req_http_type: 2,
    }
}

/// 构造一个API查询代理的请求体参数。
pub fn param(name: &str, value: &str) -> ApiAgentParam {
    ApiAgentParam {
        field_type: 0,
        field_name: name.to_string(),
        field_value: value.to_string(),
        is_head: false,
        is_body: true,
        need_encrypt: false,
        encrypt_type: 0,
    }
}

/// 构造一个爬虫查询代理。
pub fn crawler_agent(id: i64, name: &str, url: &str, kind: CrawlerKind) -> CrawlerAgentInfo {
    CrawlerAgentInfo {
        id,
        name: name.to_string(),
        url: url.to_string(),
        kind,
        target_url: String::new(),
        req_http_method: "GET".to_string(),
        req_http_headers: String::new(),
        req_http_body: String::new(),
        verify: false,
        json: false,
        req_proxy: String::new(),
        req_timeout: 5,
        site_encrypt: 0,
        tracking_field_name: String::new(),
        tracking_field_type: 0,
        site_crawling_name: String::new(),
        site_analyzed_name: String::new(),
    }
}
