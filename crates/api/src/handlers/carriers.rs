//! 运输商信息查询的外部接口。

use axum::{extract::State, response::IntoResponse, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tracking_domain::types::CarrierType;
use tracking_domain::Carrier;

use crate::error::ApiResult;
use crate::response::CommonResponse;
use crate::routes::AppState;

/// 运输商信息，包含用于客户端匹配运单号的规则。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierReply {
    pub code: String,
    pub name_cn: String,
    pub name_en: String,
    pub carrier_type: CarrierType,
    pub country_id: i32,
    pub web_site_url: String,
    pub tel: String,
    pub email: String,
    pub description: String,
    /// 字段名拼写是历史遗留的接口契约。
    #[serde(rename = "serviceAvaiable")]
    pub service_available: bool,
    pub logo_url: String,
    pub logo_filename: String,
    pub tracking_no_rules: Vec<TrackingNoRuleReply>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingNoRuleReply {
    pub id: i64,
    pub name: String,
    pub code: String,
}

impl CarrierReply {
    fn from_entity(carrier: &Carrier) -> Self {
        Self {
            code: carrier.code.clone(),
            name_cn: carrier.name_cn.clone(),
            name_en: carrier.name_en.clone(),
            carrier_type: carrier.carrier_type,
            country_id: carrier.country_id,
            web_site_url: carrier.website_url.clone().unwrap_or_default(),
            tel: carrier.tel.clone().unwrap_or_default(),
            email: carrier.email.clone().unwrap_or_default(),
            description: carrier.description.clone().unwrap_or_default(),
            service_available: carrier.service_available,
            logo_url: carrier.logo_url.clone().unwrap_or_default(),
            logo_filename: carrier.logo_filename.clone().unwrap_or_default(),
            tracking_no_rules: carrier
                .tracking_no_rules
                .iter()
                .map(|r| TrackingNoRuleReply {
                    id: r.id,
                    name: r.name.clone(),
                    code: r.code.clone(),
                })
                .collect(),
        }
    }
}

/// 执行运输商信息查询。
pub async fn carriers(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let all = state.carriers.find_all().await?;
    let data: Vec<CarrierReply> = all.iter().map(CarrierReply::from_entity).collect();
    Ok(Json(CommonResponse::success(data)))
}

/// 运单号匹配请求。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MatchCarriersRequest {
    /// 待匹配的运单号列表。
    #[serde(rename = "trackingNo")]
    pub tracking_no_list: Vec<String>,
}

/// 尝试为每个运单号匹配可能的运输商。
pub async fn match_carriers(
    State(state): State<AppState>,
    Json(req): Json<MatchCarriersRequest>,
) -> ApiResult<impl IntoResponse> {
    let tracking_no_list: Vec<String> = req
        .tracking_no_list
        .iter()
        .map(|t| t.trim().to_string())
        .collect();
    let mut matches: Vec<Vec<CarrierReply>> = vec![Vec::new(); tracking_no_list.len()];

    let all = state.carriers.find_all().await?;

    // 逐个匹配运输商关联的运单规则。
    for carrier in &all {
        for rule in &carrier.tracking_no_rules {
            let pattern = match Regex::new(&rule.code) {
                Ok(pattern) => pattern,
                Err(err) => {
                    warn!("Illegal tracking-no rule (id={}): {err}", rule.id);
                    continue;
                }
            };
            for (i, tracking_no) in tracking_no_list.iter().enumerate() {
                if pattern.is_match(tracking_no) {
                    matches[i].push(CarrierReply::from_entity(carrier));
                }
            }
        }
    }

    Ok(Json(CommonResponse::success(matches)))
}
