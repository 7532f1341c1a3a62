//! `carrier_info`表的数据访问。

use async_trait::async_trait;
use sqlx::{MySqlPool, Row};

use tracking_domain::{Carrier, CarrierRepository, CarrierType, TrackingNoRule};
use tracking_errors::TrackingResult;

const SELECT_CARRIER_BY_CODE: &str =
    "select id, country_id from carrier_info where carrier_code = ? and status = 1";

const SELECT_ALL_CARRIERS: &str = r#"select distinct ci.id, ci.carrier_code, ci.name_cn, ci.name_en, ci.carrier_type, ci.country_id,
    ci.website_url, ci.tel, ci.email, ci.description, ci.service_status,
    sba.real_path, sba.file_name,
    tnr.id, tnr.name, tnrd.code
from carrier_info ci
left join tracking_no_rule tnr on tnr.carrier_id = ci.id and tnr.status = 1
left join tracking_no_rule_detail tnrd on tnrd.rule_id = tnr.id and tnrd.status = 1
left join sys_biz_attachment sba on sba.ext_id = ci.id and sba.ext_type = 1 and sba.status = 1
where ci.status = 1 and ci.carrier_code is not null
order by ci.id, tnr.id"#;

pub struct MySqlCarrierRepository {
    pool: MySqlPool,
}

impl MySqlCarrierRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CarrierRepository for MySqlCarrierRepository {
    async fn find_by_code(&self, carrier_code: &str) -> TrackingResult<Option<Carrier>> {
        let row = sqlx::query(SELECT_CARRIER_BY_CODE)
            .bind(carrier_code)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let id: i64 = row.try_get(0)?;
                let country_id: i64 = row.try_get(1)?;
                Ok(Some(Carrier {
                    id,
                    code: carrier_code.to_string(),
                    name_cn: String::new(),
                    name_en: String::new(),
                    carrier_type: CarrierType::International,
                    country_id: country_id as i32,
                    website_url: None,
                    tel: None,
                    email: None,
                    description: None,
                    service_available: true,
                    logo_url: None,
                    logo_filename: None,
                    tracking_no_rules: Vec::new(),
                }))
            }
        }
    }

    async fn find_all(&self) -> TrackingResult<Vec<Carrier>> {
        let rows = sqlx::query(SELECT_ALL_CARRIERS).fetch_all(&self.pool).await?;

        // 关联的运单号规则在结果集中逐行展开，按运输商ID归并。
        let mut result: Vec<Carrier> = Vec::new();
        for row in rows {
            let carrier_id: i64 = row.try_get(0)?;
            let carrier_type_value: i64 = row.try_get(4)?;
            let service_status: i64 = row.try_get(10)?;

            if result.last().map(|c| c.id) != Some(carrier_id) {
                result.push(Carrier {
                    id: carrier_id,
                    code: row.try_get(1)?,
                    name_cn: row.try_get(2)?,
                    name_en: row.try_get(3)?,
                    carrier_type: CarrierType::from_value(carrier_type_value)?,
                    country_id: row.try_get::<i64, _>(5)? as i32,
                    website_url: row.try_get(6)?,
                    tel: row.try_get(7)?,
                    email: row.try_get(8)?,
                    description: row.try_get(9)?,
                    service_available: service_status != 0,
                    logo_url: row.try_get(11)?,
                    logo_filename: row.try_get(12)?,
                    tracking_no_rules: Vec::new(),
                });
            }

            let rule_id: Option<i64> = row.try_get(13)?;
            if let Some(rule_id) = rule_id {
                let rule_name: Option<String> = row.try_get(14)?;
                let rule_code: Option<String> = row.try_get(15)?;
                if let Some(carrier) = result.last_mut() {
                    carrier.tracking_no_rules.push(TrackingNoRule {
                        id: rule_id,
                        name: rule_name.unwrap_or_default(),
                        code: rule_code.unwrap_or_default(),
                    });
                }
            }
        }

        Ok(result)
    }
}
