//! 路由表。

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::post, Router};

use tracking_dispatcher::TrackingDispatchService;
use tracking_domain::CarrierRepository;

use crate::handlers::{
    carriers::{carriers, match_carriers},
    trackings::trackings,
};
use crate::panic_catch::catch_panic;

#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<TrackingDispatchService>,
    pub carriers: Arc<dyn CarrierRepository>,
    /// 单个查询请求允许的最长处理时间。
    pub request_timeout: Duration,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/trackings", post(trackings))
        .route("/carriers", post(carriers))
        .route("/carriers/match", post(match_carriers))
        .layer(middleware::from_fn(catch_panic))
        .with_state(state)
}
