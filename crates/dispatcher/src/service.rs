//! 查询调度服务。
//!
//! 一次调用处理一个客户端批次：参数校验、鉴权、分配流水号、数据库
//! 查找、推送共享区并轮询查询代理结果、事件匹配、构造响应，最后在
//! 关键路径之外异步持久化。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use tracking_common::{sign, spawn_guarded, SeqNoSource};
use tracking_domain::types::{AgentCode, LangId, Priority, TrackingResultSrc};
use tracking_domain::{
    CarrierRepository, MatchRuleRepository, TicketQueue, TicketSearch, TicketStore,
    TrackingLogRepository, TrackingResultRepository,
};
use tracking_errors::{TrackingError, TrackingResult};

use crate::freshness::FreshnessPolicy;
use crate::matcher;
use crate::persister::TrackingPersister;
use crate::rendezvous::{RendezvousOptions, TicketRendezvous};
use crate::reply::{self, OrderReply};

/// 每个原始请求中允许包含的最多运单号。
pub const MAX_BATCH_SIZE: usize = 30;
/// 客户端时间戳允许的最大偏差。
const AUTH_TIMESTAMP_WINDOW_S: i64 = 30;

/// 一次运单查询请求（已从外部接口解码）。
#[derive(Debug, Clone)]
pub struct TrackingsQuery {
    pub carrier_code: String,
    pub client_id: String,
    pub timestamp: i64,
    pub language: LangId,
    pub priority: Priority,
    pub token: String,
    pub orders: Vec<OrderQuery>,
}

/// 查询请求中的一个运单。
#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub tracking_no: String,
    pub postcode: String,
    pub dest: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// 每批允许的最多运单号。
    pub max_batch_size: usize,
    /// 共享区参数。
    pub rendezvous: RendezvousOptions,
    /// 新鲜度窗口（小时）。
    pub fresh_full_h: i64,
    pub fresh_empty_h: i64,
    /// 客户端ID到密钥的映射。
    pub auth_clients: HashMap<String, String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            rendezvous: RendezvousOptions::default(),
            fresh_full_h: 2,
            fresh_empty_h: 8,
            auth_clients: HashMap::new(),
        }
    }
}

pub struct TrackingDispatchService {
    seq_no: Arc<dyn SeqNoSource>,
    rendezvous: TicketRendezvous,
    results: Arc<dyn TrackingResultRepository>,
    rules: Arc<dyn MatchRuleRepository>,
    persister: Arc<TrackingPersister>,
    freshness: FreshnessPolicy,
    options: DispatchOptions,
}

impl TrackingDispatchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TicketStore>,
        queue: Arc<dyn TicketQueue>,
        seq_no: Arc<dyn SeqNoSource>,
        carriers: Arc<dyn CarrierRepository>,
        results: Arc<dyn TrackingResultRepository>,
        rules: Arc<dyn MatchRuleRepository>,
        logs: Arc<dyn TrackingLogRepository>,
        options: DispatchOptions,
    ) -> Self {
        let freshness = FreshnessPolicy::new(options.fresh_full_h, options.fresh_empty_h);
        let rendezvous = TicketRendezvous::new(store, queue, options.rendezvous.clone());
        let persister = Arc::new(TrackingPersister::new(
            carriers,
            Arc::clone(&results),
            logs,
        ));
        Self {
            seq_no,
            rendezvous,
            results,
            rules,
            persister,
            freshness,
            options,
        }
    }

    /// 执行一次运单批量查询。
    pub async fn query_trackings(
        &self,
        mut query: TrackingsQuery,
        client_addr: String,
    ) -> TrackingResult<Vec<OrderReply>> {
        let now = Utc::now();
        self.validate(&mut query, now)?;

        // 为每个运单号构造一个查询对象。
        let mut searches: Vec<TicketSearch> = Vec::with_capacity(query.orders.len());
        for order in &query.orders {
            match self.seq_no.next() {
                Ok(seq_no) => searches.push(TicketSearch::new(
                    seq_no,
                    query.carrier_code.clone(),
                    query.language,
                    order.tracking_no.clone(),
                    now,
                    client_addr.clone(),
                )),
                Err(err) => {
                    // 无法获取新的流水号，跳过该运单，其它运单继续。
                    warn!(
                        "Cannot allocate seq-no for tracking-no {}: {}",
                        order.tracking_no, err
                    );
                }
            }
        }

        // 从数据库加载既有跟踪结果。
        self.load_results_from_db(&mut searches).await?;

        // 需要调用查询代理的记录推送到共享区，然后轮询结果。
        let mut fetched: Vec<TicketSearch> = Vec::new();
        match self
            .rendezvous
            .push(query.priority, &searches, &self.freshness, now)
            .await
        {
            Ok(keys) => {
                if !keys.is_empty() {
                    let mut pulled = self.rendezvous.pull(keys).await?;

                    // 匹配跟踪结果中的事件。
                    let rules = self
                        .rules
                        .find_by_carrier(&query.carrier_code, now)
                        .await?;
                    for ts in &mut pulled {
                        matcher::match_events(&rules, ts);
                    }

                    // 来自查询代理的查询结果异步保存到数据库。
                    let persister = Arc::clone(&self.persister);
                    let to_save = pulled.clone();
                    spawn_guarded("save-tracking-results", async move {
                        persister.save_results(to_save).await;
                    });

                    fetched = pulled;
                }
            }
            Err(TrackingError::Overloaded) => {
                // 队列超长，放弃上游查询，仍然返回数据库结果。
                warn!(
                    "Tracking queue overloaded, upstream suppressed for carrier {}",
                    query.carrier_code
                );
            }
            Err(err) => {
                // 推送失败，放弃轮询，退化为只返回数据库结果。
                warn!("Cannot push tracking-search to queue: {err}");
            }
        }

        // 构造最终响应。
        let tracking_nos: Vec<String> =
            query.orders.iter().map(|o| o.tracking_no.clone()).collect();
        let db_list: Vec<TicketSearch> = searches
            .iter()
            .filter(|ts| ts.src == TrackingResultSrc::Db)
            .cloned()
            .collect();
        let (replies, log_list) = reply::build_replies(&tracking_nos, &db_list, &fetched);

        let persister = Arc::clone(&self.persister);
        spawn_guarded("save-tracking-logs", async move {
            persister.save_logs(log_list).await;
        });

        debug!(
            "Answered tracking batch: carrier={}, orders={}, fetched={}",
            query.carrier_code,
            replies.len(),
            fetched.len()
        );
        Ok(replies)
    }

    /// 验证请求参数是否合乎接口定义，并做规范化。
    fn validate(&self, query: &mut TrackingsQuery, now: DateTime<Utc>) -> TrackingResult<()> {
        // 校验token。
        query.client_id = query.client_id.trim().to_lowercase();
        if !query.client_id.is_empty() {
            let client_time = Utc
                .timestamp_opt(query.timestamp, 0)
                .single()
                .ok_or_else(|| TrackingError::auth_error("illegal timestamp"))?;
            if client_time < now - chrono::Duration::seconds(AUTH_TIMESTAMP_WINDOW_S) {
                return Err(TrackingError::auth_error("illegal timestamp"));
            }

            let secret = self
                .options
                .auth_clients
                .get(&query.client_id)
                .ok_or_else(|| {
                    TrackingError::auth_error(format!("unknown client id: {}", query.client_id))
                })?;
            let token = sign::sign_with_md5(&[
                &query.client_id,
                &query.timestamp.to_string(),
                secret,
            ]);
            if token != query.token {
                return Err(TrackingError::auth_error("illegal token"));
            }
        }

        // 校验运输商编号。
        query.carrier_code = query.carrier_code.trim().to_lowercase();
        if query.carrier_code.is_empty() {
            return Err(TrackingError::validation_error(
                "carrier code cannot be empty",
            ));
        }

        // 校验运单号。空单号直接丢弃，批内重复的单号原样保留。
        for order in &mut query.orders {
            order.tracking_no = order.tracking_no.trim().to_uppercase();
        }
        query.orders.retain(|o| !o.tracking_no.is_empty());

        if query.orders.is_empty() {
            return Err(TrackingError::validation_error("orders cannot be empty"));
        }
        if query.orders.len() > self.options.max_batch_size {
            return Err(TrackingError::validation_error(format!(
                "too many orders: [{}]",
                query.orders.len()
            )));
        }

        Ok(())
    }

    /// 从数据库中读取既有跟踪记录。每个查询对象都要查询一次。
    async fn load_results_from_db(&self, searches: &mut [TicketSearch]) -> TrackingResult<()> {
        for ts in searches.iter_mut() {
            if ts.tracking_no.is_empty() {
                continue;
            }

            if let Some(tr) = self
                .results
                .find_latest(&ts.carrier_code, ts.language, &ts.tracking_no)
                .await?
            {
                ts.src = TrackingResultSrc::Db;
                ts.update_time = Some(tr.update_time);
                ts.events = if tr.events_json.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_str(&tr.events_json).unwrap_or_default()
                };
                // 数据库记录必然来自于之前曾经成功的查询。
                ts.agent_code = AgentCode::Success2;
                ts.done = tr.done;
            }
        }
        Ok(())
    }
}

/// 根据配置构造调度参数。
pub fn dispatch_options(
    ticket_ttl_s: u64,
    fresh_full_h: i64,
    fresh_empty_h: i64,
    auth_clients: HashMap<String, String>,
) -> DispatchOptions {
    DispatchOptions {
        rendezvous: RendezvousOptions {
            ticket_ttl: Duration::from_secs(ticket_ttl_s),
            ..RendezvousOptions::default()
        },
        fresh_full_h,
        fresh_empty_h,
        auth_clients,
        ..DispatchOptions::default()
    }
}
