//! 应用装配。
//!
//! 按配置连接MySQL和Redis，装配调度服务、查询代理轮询池和HTTP
//! 接口，并负责各部件的启动和停止。任何后端连接失败都是致命错误。

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use tracking_api::{create_routes, AppState};
use tracking_common::SeqNoGenerator;
use tracking_config::AppConfig;
use tracking_dispatcher::{dispatch_options, TrackingDispatchService};
use tracking_domain::{TicketQueue, TicketStore};
use tracking_infrastructure::database::{
    self, MySqlAgentRepository, MySqlCarrierRepository, MySqlMatchRuleRepository,
    MySqlTrackingLogRepository, MySqlTrackingResultRepository,
};
use tracking_infrastructure::{RedisTicketQueue, RedisTicketStore};
use tracking_worker::{AgentInvoker, AgentPollingPool, InvokerOptions, PoolOptions};

pub struct Application {
    config: AppConfig,
    state: AppState,
    pool: Arc<AgentPollingPool>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        // 初始化数据库。
        let db = database::connect(&config.db.dsn, config.db.max_connections)
            .await
            .context("连接数据库失败")?;
        let carriers = Arc::new(MySqlCarrierRepository::new(db.clone()));
        let results = Arc::new(MySqlTrackingResultRepository::new(db.clone()));
        let rules = Arc::new(MySqlMatchRuleRepository::new(db.clone()));
        let agents = Arc::new(MySqlAgentRepository::new(db.clone()));
        let logs = Arc::new(MySqlTrackingLogRepository::new(db));

        // 初始化Redis共享区。
        let redis_url = config.redis.connection_url();
        let store: Arc<dyn TicketStore> = Arc::new(
            RedisTicketStore::connect(&redis_url)
                .await
                .context("连接Redis缓存失败")?,
        );
        let queue: Arc<dyn TicketQueue> = Arc::new(
            RedisTicketQueue::connect(&redis_url)
                .await
                .context("连接Redis队列失败")?,
        );

        let seq_no = Arc::new(SeqNoGenerator::new());

        let dispatch = Arc::new(TrackingDispatchService::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            seq_no,
            carriers.clone(),
            results,
            rules,
            logs,
            dispatch_options(
                config.agent.ticket_ttl_s,
                config.agent.fresh_full,
                config.agent.fresh_empty,
                config.auth.clients.clone(),
            ),
        ));

        // 初始化查询代理轮询池。
        let invoker = Arc::new(AgentInvoker::new(
            Arc::clone(&store),
            agents,
            InvokerOptions {
                result_ttl: std::time::Duration::from_secs(config.agent.result_ttl_s),
            },
        ));
        let pool = Arc::new(AgentPollingPool::new(
            queue,
            invoker,
            PoolOptions {
                pool_size: config.agent.polling_batch_size,
                idle_pause: std::time::Duration::from_millis(config.agent.idle_pause_ms),
            },
        )?);

        let state = AppState {
            dispatch,
            carriers,
            request_timeout: std::time::Duration::from_secs(config.timeout_s),
        };

        Ok(Self {
            config,
            state,
            pool,
        })
    }

    /// 启动轮询池和HTTP服务，直到收到关闭信号。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.pool.start().await;

        let router = create_routes(self.state.clone());
        let bind_address = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("绑定监听地址失败: {bind_address}"))?;
        info!("Serving @ {bind_address}");

        let serve = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .into_future();

        tokio::select! {
            result = serve => {
                result.context("HTTP服务异常退出")?;
            }
            _ = shutdown_rx.recv() => {
                info!("HTTP服务停止接收新请求");
            }
        }

        self.pool.stop().await;
        Ok(())
    }
}
