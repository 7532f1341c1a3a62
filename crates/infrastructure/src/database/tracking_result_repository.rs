//! `tracking_result`、`tracking`和`tracking_detail`表的数据访问。

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{MySqlPool, Row};

use tracking_common::sign::md5_hex;
use tracking_domain::types::{LangId, TrackingResultSrc};
use tracking_domain::{StoredTrackingResult, TrackingEvent, TrackingResultRepository};
use tracking_errors::TrackingResult;

const SELECT_RESULT_BY_TRACKING_NO: &str = r#"select tr.events_json, tr.update_time, coalesce(tr.tracking_status, -1) = 4 from tracking_result tr
inner join carrier_info ci on ci.id = tr.carrier_id
where ci.status = 1
  and tr.status = 1
  and tr.v2 = 1
  and ci.carrier_code = ?
  and tr.tracking_no = ?
  and tr.language = ?
  and tr.events_json <> ''
order by tr.update_time
limit 1"#;

const EXISTS_BY_TRACKING_NO_AND_MD5: &str = "select exists(select 1 from tracking_result tr where carrier_id = ? and language = ? and tracking_no = ? and md5 = ?)";

const INSERT_TRACKING_RESULT: &str = r#"insert into tracking_result (carrier_id, language, tracking_no, events_json, md5, status, create_time, update_time, tracking_status, v2)
values(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

const INSERT_TRACKING: &str = r#"insert into tracking(carrier_id, language, tracking_no, delivery_time, destination, collector_type, collector_real_name, create_time, update_time, status)
values(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

const INSERT_TRACKING_DETAIL: &str = r#"insert into tracking_detail(info_id, date, place, details, state, event_id, event_name, event_rule_match, status, create_time, update_time)
values(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#;

/// 跟踪结果状态。4表示已投递，1表示在途。
fn tracking_status_of(done: bool) -> i32 {
    if done {
        4
    } else {
        1
    }
}

pub struct MySqlTrackingResultRepository {
    pool: MySqlPool,
}

impl MySqlTrackingResultRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingResultRepository for MySqlTrackingResultRepository {
    async fn find_latest(
        &self,
        carrier_code: &str,
        language: LangId,
        tracking_no: &str,
    ) -> TrackingResult<Option<StoredTrackingResult>> {
        let row = sqlx::query(SELECT_RESULT_BY_TRACKING_NO)
            .bind(carrier_code)
            .bind(tracking_no)
            .bind(language.value())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| -> TrackingResult<StoredTrackingResult> {
                let update_time: chrono::NaiveDateTime = row.try_get(1)?;
                let done: i64 = row.try_get(2)?;
                Ok(StoredTrackingResult {
                    carrier_code: carrier_code.to_string(),
                    language,
                    tracking_no: tracking_no.to_string(),
                    events_json: row.try_get(0)?,
                    update_time: Utc.from_utc_datetime(&update_time),
                    done: done != 0,
                })
            })
            .transpose()?)
    }

    async fn save_result(
        &self,
        carrier_id: i64,
        language: LangId,
        tracking_no: &str,
        events_json: &str,
        at: DateTime<Utc>,
        done: bool,
    ) -> TrackingResult<Option<i64>> {
        let events_json_md5 = md5_hex(events_json);

        let exists: i64 = sqlx::query(EXISTS_BY_TRACKING_NO_AND_MD5)
            .bind(carrier_id)
            .bind(language.value())
            .bind(tracking_no)
            .bind(&events_json_md5)
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        if exists != 0 {
            // 已存在同样的记录，放弃保存。
            return Ok(None);
        }

        let result = sqlx::query(INSERT_TRACKING_RESULT)
            .bind(carrier_id)
            .bind(language.value())
            .bind(tracking_no)
            .bind(events_json)
            .bind(&events_json_md5)
            .bind(1) // status
            .bind(at.naive_utc())
            .bind(at.naive_utc())
            .bind(tracking_status_of(done))
            .bind(1) // v2
            .execute(&self.pool)
            .await?;

        Ok(Some(result.last_insert_id() as i64))
    }

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
    ) -> TrackingResult<i64> {
        let destination = if destination.is_empty() {
            None
        } else {
            Some(destination)
        };

        let result = sqlx::query(INSERT_TRACKING)
            .bind(carrier_id)
            .bind(language.value())
            .bind(tracking_no)
            .bind(delivery_time.map(|t| t.naive_utc()))
            .bind(destination)
            .bind(collector_type.value())
            .bind(collector_real_name)
            .bind(at.naive_utc())
            .bind(at.naive_utc())
            .bind(1) // status
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_id() as i64)
    }

    async fn save_detail(
        &self,
        tracking_id: i64,
        event: &TrackingEvent,
        at: DateTime<Utc>,
    ) -> TrackingResult<i64> {
        let result = sqlx::query(INSERT_TRACKING_DETAIL)
            .bind(tracking_id)
            .bind(event.date.naive_utc())
            .bind(&event.place)
            .bind(&event.details)
            .bind(event.state)
            .bind(None::<i64>) // event_id
            .bind(None::<String>) // event_name
            .bind(None::<i32>) // event_rule_match
            .bind(1) // status
            .bind(at.naive_utc())
            .bind(at.naive_utc())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_id() as i64)
    }
}
