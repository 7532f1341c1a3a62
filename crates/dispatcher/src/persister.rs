//! 查询结果和审计日志的持久化。
//!
//! 所有持久化都是尽力而为，在请求关键路径之外异步执行。单条记录
//! 失败只记录日志，不影响其它记录。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tracking_domain::types::{AgentCode, TrackingResultSrc};
use tracking_domain::{
    CarrierRepository, TicketSearch, TrackingLogEntry, TrackingLogRepository,
    TrackingResultRepository,
};
use tracking_errors::TrackingResult;

/// 审计日志的操作者标记。
const LOG_OPERATOR: &str = "auto";
/// 外部接口指定carrierCode的匹配方式。
const MATCH_TYPE_BY_CARRIER_CODE: i32 = 2;

pub struct TrackingPersister {
    carriers: Arc<dyn CarrierRepository>,
    results: Arc<dyn TrackingResultRepository>,
    logs: Arc<dyn TrackingLogRepository>,
}

impl TrackingPersister {
    pub fn new(
        carriers: Arc<dyn CarrierRepository>,
        results: Arc<dyn TrackingResultRepository>,
        logs: Arc<dyn TrackingLogRepository>,
    ) -> Self {
        Self {
            carriers,
            results,
            logs,
        }
    }

    /// 保存查询代理返回的跟踪结果。
    pub async fn save_results(&self, list: Vec<TicketSearch>) {
        let now = Utc::now();
        for ts in &list {
            if let Err(err) = self.save_one_result(ts, now).await {
                warn!(
                    "Cannot save tracking result (carrier-code={}, tracking-no={}): {}",
                    ts.carrier_code, ts.tracking_no, err
                );
            }
        }
    }

    async fn save_one_result(&self, ts: &TicketSearch, now: DateTime<Utc>) -> TrackingResult<()> {
        // 失败的查询不产生跟踪记录，只产生审计日志。
        if !ts.agent_code.is_success() {
            return Ok(());
        }

        let events_json = if ts.events.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&ts.events)?
        };

        let carrier = match self.carriers.find_by_code(&ts.carrier_code).await? {
            Some(carrier) => carrier,
            // 未知运输商，跳过跟踪记录。
            None => return Ok(()),
        };

        let saved = self
            .results
            .save_result(
                carrier.id,
                ts.language,
                &ts.tracking_no,
                &events_json,
                now,
                ts.done,
            )
            .await?;
        if saved.is_none() {
            info!(
                "Duplicated tracking result(carrier-code={}, language={}, tracking-no={})",
                ts.carrier_code,
                ts.language.as_str(),
                ts.tracking_no
            );
            return Ok(());
        }

        let tracking_id = self
            .results
            .save_tracking(
                carrier.id,
                ts.language,
                &ts.tracking_no,
                if ts.done { ts.done_time } else { None },
                &ts.done_place,
                ts.src,
                &ts.agent_name,
                now,
            )
            .await?;

        for event in &ts.events {
            self.results.save_detail(tracking_id, event, now).await?;
        }

        Ok(())
    }

    /// 为每条已返回客户端的查询对象写入一条审计日志。
    pub async fn save_logs(&self, list: Vec<TicketSearch>) {
        let now = Utc::now();
        for ts in &list {
            if let Err(err) = self.save_one_log(ts, now).await {
                warn!(
                    "Cannot save tracking log (tracking-no={}): {}",
                    ts.tracking_no, err
                );
            }
        }
    }

    async fn save_one_log(&self, ts: &TicketSearch, now: DateTime<Utc>) -> TrackingResult<()> {
        let (result_status, note) = match ts.agent_code {
            AgentCode::Success | AgentCode::Success2 => {
                if ts.src != TrackingResultSrc::Db {
                    (1, "查询成功")
                } else if ts.done {
                    (1, "查询缓存成功（已妥投）")
                } else {
                    (1, "查询缓存成功（未妥投）")
                }
            }
            AgentCode::NoTracking => (1, "未查询到单号"),
            AgentCode::ParseFailed => (0, "无法解析目标网站页面"),
            AgentCode::Timeout => (0, "查询目标网站超时"),
            AgentCode::Other => (0, "未知错误"),
        };

        let mut result_note = note.to_string();
        if result_status == 0 && !ts.err.is_empty() {
            result_note = format!("{result_note}: {}", ts.err);
        }

        // 查询耗时。结束时间早于开始时间时记为哨兵最大值；没有完整的
        // 代理计时（比如数据库结果）时退化为响应时刻减去请求时刻。
        let timing_ms = match (ts.agent_start_time, ts.agent_end_time) {
            (Some(start), Some(end)) => {
                if end < start {
                    i32::MAX
                } else {
                    (end - start).num_milliseconds().min(i32::MAX as i64) as i32
                }
            }
            _ => {
                let end = ts.agent_end_time.unwrap_or(now);
                (end - ts.req_time)
                    .num_milliseconds()
                    .clamp(0, i32::MAX as i64) as i32
            }
        };

        // 没有匹配到运输商时也应该记录日志。
        let (carrier_id, country_id) = match self.carriers.find_by_code(&ts.carrier_code).await? {
            Some(carrier) => (carrier.id, carrier.country_id),
            None => (0, 0),
        };

        let entry = TrackingLogEntry {
            carrier_id,
            tracking_no: ts.tracking_no.clone(),
            match_type: MATCH_TYPE_BY_CARRIER_CODE,
            country_id,
            timing_ms,
            host: ts.client_addr.clone(),
            result_status,
            collector_type: ts.src,
            operator: LOG_OPERATOR.to_string(),
            created_at: now,
            request_time: ts.req_time,
            agent_start_time: ts.agent_start_time,
            agent_end_time: ts.agent_end_time,
            agent_raw_text: ts.agent_raw_text.clone(),
            result_note,
        };

        self.logs.save_log(&entry).await?;
        Ok(())
    }
}
