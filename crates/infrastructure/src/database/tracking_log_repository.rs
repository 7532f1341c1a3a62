//! `tracking_log`表的数据访问。

use async_trait::async_trait;
use sqlx::MySqlPool;

use tracking_domain::types::TrackingResultSrc;
use tracking_domain::{TrackingLogEntry, TrackingLogRepository};
use tracking_errors::TrackingResult;

const INSERT_TRACKING_LOG: &str = r#"insert into tracking_log (carrier_id, tracking_no, match_type, country_id, timing, host, result_status, statistics_date, collector_type, status,
    create_time, creator, update_time, modifier, request_time, crawler_req_time, crawler_resp_time, crawler_resp_body, result_note)
values(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

pub struct MySqlTrackingLogRepository {
    pool: MySqlPool,
}

impl MySqlTrackingLogRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingLogRepository for MySqlTrackingLogRepository {
    async fn save_log(&self, entry: &TrackingLogEntry) -> TrackingResult<i64> {
        let collector_type = if entry.collector_type == TrackingResultSrc::Unknown {
            None
        } else {
            Some(entry.collector_type.value())
        };
        let now = entry.created_at.naive_utc();

        let result = sqlx::query(INSERT_TRACKING_LOG)
            .bind(entry.carrier_id)
            .bind(&entry.tracking_no)
            .bind(entry.match_type)
            .bind(entry.country_id)
            .bind(entry.timing_ms)
            .bind(&entry.host)
            .bind(entry.result_status)
            .bind(now) // statistics_date
            .bind(collector_type)
            .bind(1) // status
            .bind(now)
            .bind(&entry.operator)
            .bind(now)
            .bind(&entry.operator)
            .bind(entry.request_time.naive_utc())
            .bind(entry.agent_start_time.map(|t| t.naive_utc()))
            .bind(entry.agent_end_time.map(|t| t.naive_utc()))
            .bind(&entry.agent_raw_text)
            .bind(&entry.result_note)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_id() as i64)
    }
}
