//! API错误到HTTP响应的映射。
//!
//! 业务可恢复的错误（鉴权失败、后端暂时不可用）以200+`status="E"`
//! 返回；请求本身不合法时返回400；未预期的panic由中间件转为500。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use tracking_errors::TrackingError;

use crate::response::CommonResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Tracking(err) = self;
        let status = match &err {
            TrackingError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        };
        (status, Json(CommonResponse::error(err.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
