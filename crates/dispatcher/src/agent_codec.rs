//! 查询代理结果的解码。
//!
//! 查询代理写回共享缓存的是归一化后的原始文本，请求侧负责把它解释
//! 为跟踪结果：首先尝试按单运单记录解析，失败后尝试按批量包装对象
//! 解析（要求恰好包含一条记录），仍然失败则记为解析错误。

use serde::Deserialize;
use tracing::warn;

use tracking_common::timefmt;
use tracking_domain::ports::rendezvous::{fields, seq_no_of_key};
use tracking_domain::types::{AgentCode, LangId, TrackingResultSrc};
use tracking_domain::{TicketSearch, TrackingEvent};

/// 轮询时读取的字段，顺序和`decode_ticket`的下标约定一致。
pub const PULL_FIELDS: [&str; 12] = [
    fields::STATUS,
    fields::REQ_TIME,
    fields::CARRIER_CODE,
    fields::LANGUAGE,
    fields::TRACKING_NO,
    fields::CLIENT_ADDR,
    fields::AGENT_SRC,
    fields::AGENT_ERR,
    fields::AGENT_RESULT,
    fields::AGENT_NAME,
    fields::AGENT_START_TIME,
    fields::AGENT_END_TIME,
];

/// 查询代理返回值中的某个运单。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrackingRecord {
    /// 响应码。
    code: i64,
    /// 响应码对应的消息。该字段似乎已经弃用，解码时忽略。
    #[serde(rename = "codeMg")]
    _code_mg: String,
    /// 查询代理返回值。
    #[serde(rename = "returnValue")]
    _return_value: String,
    /// 查询代理抓取的所有事件集合。
    #[serde(rename = "trackingEventList")]
    tracking_event_list: Vec<RawTrackingEvent>,
    /// 查询代理返回的消息。
    #[serde(rename = "cMess")]
    c_mess: String,
    /// 对应的运单号。
    #[serde(rename = "trackingNo")]
    _tracking_no: String,
}

/// 查询代理返回值的某个运单的某个事件。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrackingEvent {
    date: String,
    place: String,
    details: String,
}

/// 查询代理的批量返回值。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResponseWrapper {
    code: String,
    message: String,
    items: Vec<RawTrackingRecord>,
}

/// 解码后的查询代理结果。
#[derive(Debug)]
pub struct ParsedAgentResult {
    pub code: AgentCode,
    pub message: String,
    pub events: Vec<TrackingEvent>,
}

/// 解释查询代理写回的原始文本。
pub fn parse_agent_result(raw: &str) -> ParsedAgentResult {
    if raw.is_empty() {
        warn!("Cannot parse empty agent result json");
        return ParsedAgentResult {
            code: AgentCode::Timeout,
            message: String::new(),
            events: Vec::new(),
        };
    }

    match serde_json::from_str::<RawTrackingRecord>(raw) {
        Ok(record) => ParsedAgentResult {
            code: AgentCode::from_value(record.code),
            message: record.c_mess,
            events: map_events(record.tracking_event_list),
        },
        Err(_) => match serde_json::from_str::<RawResponseWrapper>(raw) {
            Err(err) => {
                warn!("Cannot parse agent result json: {raw}. cause={err}");
                ParsedAgentResult {
                    code: AgentCode::ParseFailed,
                    message: "cannot parse agent response".to_string(),
                    events: Vec::new(),
                }
            }
            Ok(wrapper) if wrapper.items.len() != 1 => {
                warn!(
                    "Length of agent result should be just 1, but {}",
                    wrapper.items.len()
                );
                ParsedAgentResult {
                    code: AgentCode::Other,
                    message: wrapper.message,
                    events: Vec::new(),
                }
            }
            Ok(wrapper) => {
                let code = match wrapper.code.trim().parse::<i64>() {
                    Ok(v) => AgentCode::from_value(v),
                    Err(_) => AgentCode::ParseFailed,
                };
                let record = wrapper.items.into_iter().next().expect("checked length");
                ParsedAgentResult {
                    code,
                    message: wrapper.message,
                    events: map_events(record.tracking_event_list),
                }
            }
        },
    }
}

fn map_events(raw_events: Vec<RawTrackingEvent>) -> Vec<TrackingEvent> {
    raw_events
        .into_iter()
        .map(|e| TrackingEvent {
            date: timefmt::parse_datetime(&e.date),
            details: e.details,
            place: e.place,
            state: 0,
        })
        .collect()
}

/// 把从共享缓存读出的字段解码为查询对象。
/// `values`的顺序必须和[`PULL_FIELDS`]一致。
pub fn decode_ticket(key: &str, values: &[Option<String>]) -> TicketSearch {
    let text = |i: usize| values[i].clone().unwrap_or_default();

    let req_time = timefmt::parse_datetime(&text(1));
    let carrier_code = text(2);
    let language = LangId::parse(&text(3)).unwrap_or_else(|_| {
        warn!("Illegal language in ticket: {:?}", values[3]);
        LangId::En
    });
    let tracking_no = text(4);
    let client_addr = text(5);

    // 来源默认为爬虫，由查询代理写回的agentSrc覆盖。
    let src = values[6]
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(TrackingResultSrc::from_value)
        .unwrap_or(TrackingResultSrc::Crawler);

    let agent_err = text(7);
    let raw = text(8).trim().to_string();
    let agent_name = text(9);
    let agent_start_time = values[10]
        .as_deref()
        .and_then(timefmt::parse_datetime_opt);
    let agent_end_time = values[11]
        .as_deref()
        .and_then(timefmt::parse_datetime_opt);

    let parsed = parse_agent_result(&raw);

    // 调用代理没有出现错误时，从代理的响应结果中获取错误信息。
    let err = if agent_err.is_empty() {
        parsed.message
    } else {
        agent_err
    };

    let mut ts = TicketSearch::new(
        seq_no_of_key(key).to_string(),
        carrier_code,
        language,
        tracking_no,
        req_time,
        client_addr,
    );
    ts.src = src;
    ts.agent_name = agent_name;
    ts.agent_start_time = agent_start_time;
    ts.agent_end_time = agent_end_time;
    ts.events = parsed.events;
    ts.agent_code = parsed.code;
    ts.err = err;
    ts.agent_raw_text = raw;
    ts
}
