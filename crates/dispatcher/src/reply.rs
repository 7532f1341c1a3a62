//! 响应结果的构造。
//!
//! 响应中的运单记录和请求中的运单记录数量、顺序保持一致。优先使用
//! 查询代理返回的结果，其次使用数据库记录，两者都不存在时凭空构造
//! 一条表示超时的记录。

use serde::Serialize;

use tracking_common::timefmt;
use tracking_domain::types::TrackingResultSrc;
use tracking_domain::TicketSearch;

/// 查询响应中的事件。
#[derive(Debug, Clone, Serialize)]
pub struct EventReply {
    /// 事件时间。
    pub date: String,
    /// 事件状态。
    pub state: i32,
    /// 事件地点。
    pub place: String,
    /// 事件详细。
    pub info: String,
}

/// 查询响应中的一条运单。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReply {
    /// 运单号。
    pub tracking_no: String,
    /// 查询流水号。
    pub seq_no: String,
    /// 查询状态，即是否获得了能够解析的查询结果（即使结果为空）。
    pub state: i32,
    /// 查询状态对应的文本。
    pub message: String,
    /// 是否已妥投。
    pub delivered: bool,
    /// 妥投的时间。
    pub delivery_date: String,
    /// 妥投的目的地。
    pub destination: String,
    /// 此响应是否来自于缓存。
    pub cached: bool,
    /// 此响应的缓存时间（UTC）。
    pub cached_time: String,
    /// 运单包含的事件。
    pub events: Vec<EventReply>,
}

/// 根据查询对象构造一条运单响应。
pub fn build_order_reply(ts: &TicketSearch) -> OrderReply {
    let events = ts
        .events
        .iter()
        .map(|evt| EventReply {
            date: timefmt::format_datetime(&evt.date),
            state: evt.state,
            place: evt.place.clone(),
            info: evt.details.clone(),
        })
        .collect();

    let cached = ts.src == TrackingResultSrc::Db;
    let cached_time = match (&ts.update_time, cached) {
        (Some(t), true) => timefmt::format_datetime(t),
        _ => String::new(),
    };

    let mut reply = OrderReply {
        tracking_no: ts.tracking_no.clone(),
        seq_no: ts.seq_no.clone(),
        state: 0,
        message: String::new(),
        delivered: false,
        delivery_date: String::new(),
        destination: String::new(),
        cached,
        cached_time,
        events,
    };

    if ts.agent_code.is_success() {
        // 结果来自于数据库或者查询代理爬取的有效内容。
        reply.state = 1;
        if ts.done {
            reply.delivered = true;
            reply.delivery_date = ts
                .done_time
                .map(|t| timefmt::format_datetime(&t))
                .unwrap_or_default();
            reply.destination = ts.done_place.clone();
        }
    } else {
        // 查询代理没有返回可用的内容。
        reply.state = 0;
        reply.message = ts.err.clone();
    }

    reply
}

/// 构造一条表示超时的空运单响应。
pub fn build_timeout_order_reply(tracking_no: &str) -> OrderReply {
    OrderReply {
        tracking_no: tracking_no.to_string(),
        seq_no: String::new(),
        state: 0,
        message: "Timeout".to_string(),
        delivered: false,
        delivery_date: String::new(),
        destination: String::new(),
        cached: false,
        cached_time: String::new(),
        events: Vec::new(),
    }
}

/// 组合数据库结果和查询代理结果，构造最终的响应。
///
/// `db_list`是从数据库满足的查询对象，`fetched`是查询代理返回的查询
/// 对象。返回响应集合（按`tracking_nos`的顺序）以及需要写入审计日志
/// 的查询对象集合。
pub fn build_replies(
    tracking_nos: &[String],
    db_list: &[TicketSearch],
    fetched: &[TicketSearch],
) -> (Vec<OrderReply>, Vec<TicketSearch>) {
    fn find(list: &[TicketSearch], tracking_no: &str) -> Option<TicketSearch> {
        list.iter()
            .find(|ts| ts.tracking_no == tracking_no)
            .cloned()
    }

    let mut replies = Vec::with_capacity(tracking_nos.len());
    let mut log_list = Vec::new();

    for tracking_no in tracking_nos {
        let ts2 = find(fetched, tracking_no);
        let ts1 = find(db_list, tracking_no);

        let chosen = match (ts1, ts2) {
            (None, None) => {
                // 既没有数据库结果也没有查询代理结果，凭空构造一条
                // 超时记录，运单号取自请求本身。
                replies.push(build_timeout_order_reply(tracking_no));
                continue;
            }
            (Some(ts1), None) => ts1,
            (None, Some(ts2)) => ts2,
            (Some(ts1), Some(ts2)) => {
                if ts1.is_ok() && !ts2.is_ok() {
                    ts1
                } else {
                    ts2
                }
            }
        };

        replies.push(build_order_reply(&chosen));
        log_list.push(chosen);
    }

    (replies, log_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tracking_domain::types::{AgentCode, LangId};

    fn search(tracking_no: &str, src: TrackingResultSrc) -> TicketSearch {
        let mut ts = TicketSearch::new(
            "9".into(),
            "dhl".into(),
            LangId::En,
            tracking_no.into(),
            Utc::now(),
            "127.0.0.1".into(),
        );
        ts.src = src;
        ts.agent_code = AgentCode::Success;
        ts
    }

    #[test]
    fn test_order_preserved_and_counts_match() {
        let nos: Vec<String> = vec!["A".into(), "B".into(), "C".into()];
        let db = vec![search("B", TrackingResultSrc::Db)];
        let fetched = vec![search("C", TrackingResultSrc::Crawler)];

        let (replies, logged) = build_replies(&nos, &db, &fetched);
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0].tracking_no, "A");
        assert_eq!(replies[1].tracking_no, "B");
        assert_eq!(replies[2].tracking_no, "C");
        assert_eq!(logged.len(), 2);
    }

    #[test]
    fn test_both_missing_yields_timeout_record() {
        let nos: Vec<String> = vec!["A".into()];
        let (replies, logged) = build_replies(&nos, &[], &[]);
        assert_eq!(replies[0].state, 0);
        assert_eq!(replies[0].message, "Timeout");
        assert_eq!(replies[0].seq_no, "");
        assert!(logged.is_empty());
    }

    #[test]
    fn test_failed_fetch_falls_back_to_db_record() {
        let nos: Vec<String> = vec!["A".into()];
        let db = vec![search("A", TrackingResultSrc::Db)];
        let mut bad = search("A", TrackingResultSrc::Crawler);
        bad.err = "$调用API失败$".into();
        bad.agent_code = AgentCode::Other;

        let (replies, _) = build_replies(&nos, &db, &[bad]);
        assert!(replies[0].cached);
        assert_eq!(replies[0].state, 1);
    }

    #[test]
    fn test_successful_fetch_preferred_over_db() {
        let nos: Vec<String> = vec!["A".into()];
        let db = vec![search("A", TrackingResultSrc::Db)];
        let fetched = vec![search("A", TrackingResultSrc::Crawler)];

        let (replies, _) = build_replies(&nos, &db, &fetched);
        assert!(!replies[0].cached);
    }

    #[test]
    fn test_delivered_reply_carries_date_and_place() {
        let mut ts = search("A", TrackingResultSrc::Crawler);
        ts.done = true;
        ts.done_time = Some(timefmt::parse_datetime("2024-01-02 03:04:05"));
        ts.done_place = "LAX".into();

        let reply = build_order_reply(&ts);
        assert_eq!(reply.state, 1);
        assert!(reply.delivered);
        assert_eq!(reply.delivery_date, "2024-01-02 03:04:05");
        assert_eq!(reply.destination, "LAX");
    }

    #[test]
    fn test_error_reply_surfaces_message() {
        let mut ts = search("A", TrackingResultSrc::Crawler);
        ts.agent_code = AgentCode::ParseFailed;
        ts.err = "bad page".into();

        let reply = build_order_reply(&ts);
        assert_eq!(reply.state, 0);
        assert_eq!(reply.message, "bad page");
        assert!(!reply.delivered);
    }
}
