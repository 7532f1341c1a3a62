//! 运单跟踪查询的外部接口。

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use tracking_dispatcher::{OrderQuery, TrackingsQuery};
use tracking_domain::types::{LangId, Priority};
use tracking_errors::TrackingError;

use crate::error::ApiResult;
use crate::response::CommonResponse;
use crate::routes::AppState;

/// 查询请求。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackingsRequest {
    /// 运输商代号。
    pub carrier_code: String,
    /// 客户端ID。
    pub client_id: String,
    /// 时间戳（秒）。
    pub timestamp: i64,
    /// 期望返回的语言。
    pub language: LangId,
    /// 优先级(0-2)。
    pub priority: Priority,
    /// 和客户端ID对应的鉴权标记。
    pub token: String,
    /// 请求包含的所有待查询运单。
    pub orders: Vec<OrderRequest>,
}

impl Default for TrackingsRequest {
    fn default() -> Self {
        Self {
            carrier_code: String::new(),
            client_id: String::new(),
            timestamp: 0,
            language: LangId::En,
            priority: Priority::Low,
            token: String::new(),
            orders: Vec::new(),
        }
    }
}

/// 查询请求中的一个运单。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrderRequest {
    /// 运单号。
    #[serde(rename = "trackingNo")]
    pub tracking_no: String,
    /// 收件人邮编。
    pub postcode: String,
    /// 收件人地址。
    pub dst: String,
    /// 发件日期。
    pub date: String,
}

/// 执行运单跟踪状态查询。
pub async fn trackings(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<TrackingsRequest>,
) -> ApiResult<impl IntoResponse> {
    let client_addr = remote_addr(&headers, addr);

    let query = TrackingsQuery {
        carrier_code: req.carrier_code,
        client_id: req.client_id,
        timestamp: req.timestamp,
        language: req.language,
        priority: req.priority,
        token: req.token,
        orders: req
            .orders
            .into_iter()
            .map(|o| OrderQuery {
                tracking_no: o.tracking_no,
                postcode: o.postcode,
                dest: o.dst,
                date: o.date,
            })
            .collect(),
    };

    let data = tokio::time::timeout(
        state.request_timeout,
        state.dispatch.query_trackings(query, client_addr),
    )
    .await
    .map_err(|_| TrackingError::Internal("request timed out".to_string()))??;
    Ok(Json(CommonResponse::success(data)))
}

/// 获取客户端的地址，可能包含各级代理服务器。
fn remote_addr(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if !forwarded.is_empty() {
            return forwarded.to_string();
        }
    }
    addr.ip().to_string()
}
