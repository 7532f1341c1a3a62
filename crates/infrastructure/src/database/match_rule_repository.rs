//! `tracking_event_rule`表的数据访问。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};
use tracing::warn;

use tracking_domain::{MatchRule, MatchRuleRepository};
use tracking_errors::TrackingResult;

const SELECT_MATCH_RULES_BY_CARRIER: &str = r#"select ter.id, ted.target_type, ter.content, tes1.name_en from tracking_event_rule ter
join tracking_event_rule_detail ted on ted.event_rule_id = ter.id
join carrier_info ci on ci.id = ted.carrier_id
join tracking_event_info tei on tei.id = ter.event_id
join tracking_event_status tes1 on tes1.id = tei.event_status_id
join tracking_event_status tes2 on tes2.id = tes1.parent_id
where ci.carrier_code = ?
  and ci.status = 1
  and ted.status = 1
  and ter.status = 1
  and tes1.status = 1
  and tes2.status = 1
  and tei.start_time <= ?
  and tei.end_time >= ?
order by ter.id"#;

pub struct MySqlMatchRuleRepository {
    pool: MySqlPool,
}

impl MySqlMatchRuleRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchRuleRepository for MySqlMatchRuleRepository {
    async fn find_by_carrier(
        &self,
        carrier_code: &str,
        at: DateTime<Utc>,
    ) -> TrackingResult<Vec<MatchRule>> {
        let rows = sqlx::query(SELECT_MATCH_RULES_BY_CARRIER)
            .bind(carrier_code)
            .bind(at.naive_utc())
            .bind(at.naive_utc())
            .fetch_all(&self.pool)
            .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = match row.try_get(0) {
                Ok(v) => v,
                Err(e) => {
                    // 单条规则解码失败时跳过，不影响其它规则。
                    warn!("Skip unreadable match rule row: {e}");
                    continue;
                }
            };
            result.push(MatchRule::new(
                id,
                row.try_get(1)?,
                row.try_get(2)?,
                row.try_get(3)?,
            ));
        }

        Ok(result)
    }
}
