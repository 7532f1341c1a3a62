//! 查询代理元数据（`tracking_api`和`tracking_crawler_info`）的数据访问。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

use tracking_domain::{
    AgentRepository, ApiAgentInfo, ApiAgentParam, CrawlerAgentInfo, CrawlerKind,
};
use tracking_errors::TrackingResult;

const SELECT_API_AGENT_BY_CARRIER: &str = r#"select ta.id, ta.name, ta.api_url, ta.request_type
from tracking_api ta
join carrier_info ci on ci.id = ta.carrier_id
where ci.carrier_code = ?
  and ci.status = 1
  and ta.status = 1
  and ta.service_status = 1
  and ta.start_time <= ?
  and ta.end_time >= ?"#;

const SELECT_API_PARAMS_BY_API_ID: &str = r#"select tap.field_type, tap.field_name, tap.field_value, tap.is_head_param, tap.is_body_param, tap.need_encrypt, coalesce(tae.encrypt_type, 0)
from tracking_api_param tap
left join tracking_api_encrypt tae on tap.encrypt_id = tae.id and tae.status = 1
where api_id = ?
  and tap.status = 1
order by tap.sort"#;

const SELECT_CRAWLER_AGENT_BY_CARRIER: &str = r#"select tci.id,
    tci.name, tci.req_url, tci.type, coalesce(tcp.req_url, ''), coalesce(tcp.req_method, ''), coalesce(tcp.req_headers, ''), coalesce(tcp.req_data, ''), coalesce(tcp.req_verify, 0), coalesce(tcp.req_json, 0), coalesce(tcp.req_proxy, ''),
    coalesce(tcp.req_timeout, 0), coalesce(tcp.site_encrypt, 0), coalesce(tcp.tracking_field_name, ''), coalesce(tcp.tracking_field_type, 0), coalesce(tcp.site_crawling_name, ''), coalesce(tcp.site_analyzed_name, '')
from tracking_crawler_info tci
left join tracking_crawler_param tcp on tcp.info_id = tci.id
join carrier_info ci on ci.id = tci.carrier_id
where ci.carrier_code = ?
  and ci.status = 1
  and tci.status = 1
  and (tcp.status = 1 or tcp.status is null)
  and tci.service_status = 1
  and tci.start_time <= ?
  and tci.end_time >= ?
order by tci.priority limit 1"#;

pub struct MySqlAgentRepository {
    pool: MySqlPool,
}

impl MySqlAgentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for MySqlAgentRepository {
    async fn find_api_agent(
        &self,
        carrier_code: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<Option<ApiAgentInfo>> {
        let row = sqlx::query(SELECT_API_AGENT_BY_CARRIER)
            .bind(carrier_code)
            .bind(at.naive_utc())
            .bind(at.naive_utc())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| -> TrackingResult<ApiAgentInfo> {
                Ok(ApiAgentInfo {
                    id: row.try_get(0)?,
                    name: row.try_get(1)?,
                    url: row.try_get(2)?,
                    req_http_type: row.try_get::<i64, _>(3)? as i32,
                })
            })
            .transpose()?)
    }

    async fn find_api_params(&self, api_id: i64) -> TrackingResult<Vec<ApiAgentParam>> {
        let rows = sqlx::query(SELECT_API_PARAMS_BY_API_ID)
            .bind(api_id)
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            result.push(ApiAgentParam {
                field_type: row.try_get::<i64, _>(0)? as i32,
                field_name: row.try_get(1)?,
                field_value: row.try_get(2)?,
                is_head: row.try_get::<i64, _>(3)? != 0,
                is_body: row.try_get::<i64, _>(4)? != 0,
                need_encrypt: row.try_get::<i64, _>(5)? != 0,
                encrypt_type: row.try_get::<i64, _>(6)? as i32,
            });
        }
        Ok(result)
    }

    async fn find_crawler_agent(
        &self,
        carrier_code: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<Option<CrawlerAgentInfo>> {
        let row = sqlx::query(SELECT_CRAWLER_AGENT_BY_CARRIER)
            .bind(carrier_code)
            .bind(at.naive_utc())
            .bind(at.naive_utc())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|row| -> TrackingResult<CrawlerAgentInfo> {
                let kind: String = row.try_get(3)?;
                Ok(CrawlerAgentInfo {
                    id: row.try_get(0)?,
                    name: row.try_get(1)?,
                    url: row.try_get(2)?,
                    kind: CrawlerKind::parse(&kind),
                    target_url: row.try_get(4)?,
                    req_http_method: row.try_get(5)?,
                    req_http_headers: row.try_get(6)?,
                    req_http_body: row.try_get(7)?,
                    verify: row.try_get::<i64, _>(8)? != 0,
                    json: row.try_get::<i64, _>(9)? != 0,
                    req_proxy: row.try_get(10)?,
                    req_timeout: row.try_get::<i64, _>(11)? as i32,
                    site_encrypt: row.try_get::<i64, _>(12)? as i32,
                    tracking_field_name: row.try_get(13)?,
                    tracking_field_type: row.try_get::<i64, _>(14)? as i32,
                    site_crawling_name: row.try_get(15)?,
                    site_analyzed_name: row.try_get(16)?,
                })
            })
            .transpose()?)
    }
}
