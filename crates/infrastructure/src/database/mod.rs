//! MySQL数据访问层。

pub mod agent_repository;
pub mod carrier_repository;
pub mod match_rule_repository;
pub mod tracking_log_repository;
pub mod tracking_result_repository;

pub use agent_repository::MySqlAgentRepository;
pub use carrier_repository::MySqlCarrierRepository;
pub use match_rule_repository::MySqlMatchRuleRepository;
pub use tracking_log_repository::MySqlTrackingLogRepository;
pub use tracking_result_repository::MySqlTrackingResultRepository;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::debug;
use tracking_errors::TrackingResult;

/// 根据连接字符串创建数据库连接池并验证连通性。
pub async fn connect(dsn: &str, max_connections: u32) -> TrackingResult<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(dsn)
        .await?;

    sqlx::query("select 1").execute(&pool).await?;
    debug!("Connected to mysql");
    Ok(pool)
}
