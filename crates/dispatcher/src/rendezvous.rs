//! 查询对象的共享区交接。
//!
//! 请求侧把需要调用查询代理的查询对象写入共享缓存并推送到优先级
//! 队列，然后轮询缓存，直到所有查询对象都有结果或者达到轮询上限。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use tracking_common::timefmt;
use tracking_domain::ports::rendezvous::{fields, queue_topic, ticket_key};
use tracking_domain::types::{Priority, TicketStatus};
use tracking_domain::{TicketQueue, TicketSearch, TicketStore};
use tracking_errors::{TrackingError, TrackingResult};

use crate::agent_codec::{self, PULL_FIELDS};
use crate::freshness::{FreshnessDecision, FreshnessPolicy};

#[derive(Debug, Clone)]
pub struct RendezvousOptions {
    /// 查询队列的最大长度。
    pub max_queue_size: i64,
    /// 轮询缓存的最大次数。
    pub max_pull_count: u32,
    /// 查询对象在共享缓存中的存活时间。
    pub ticket_ttl: Duration,
    /// 前7轮轮询的间隔。
    pub pull_interval_early: Duration,
    /// 第8轮起的轮询间隔。
    pub pull_interval_late: Duration,
}

impl Default for RendezvousOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_pull_count: 80,
            ticket_ttl: Duration::from_secs(26),
            pull_interval_early: Duration::from_millis(500),
            pull_interval_late: Duration::from_millis(300),
        }
    }
}

pub struct TicketRendezvous {
    store: Arc<dyn TicketStore>,
    queue: Arc<dyn TicketQueue>,
    options: RendezvousOptions,
}

impl TicketRendezvous {
    pub fn new(
        store: Arc<dyn TicketStore>,
        queue: Arc<dyn TicketQueue>,
        options: RendezvousOptions,
    ) -> Self {
        Self {
            store,
            queue,
            options,
        }
    }

    /// 将需要调用查询代理的查询对象推送到共享缓存和队列。
    /// 返回已推送的缓存键集合。队列超长时整批拒绝。
    pub async fn push(
        &self,
        priority: Priority,
        searches: &[TicketSearch],
        policy: &FreshnessPolicy,
        now: DateTime<Utc>,
    ) -> TrackingResult<Vec<String>> {
        let topic = queue_topic(priority);

        // 检查查询队列是否已经超长。
        let queue_len = self.queue.length(&topic).await?;
        if queue_len + searches.len() as i64 > self.options.max_queue_size {
            return Err(TrackingError::Overloaded);
        }

        let mut keys = Vec::new();
        for ts in searches {
            // 跳过空单号，这种查询请求是不合法的。
            if ts.tracking_no.is_empty() {
                continue;
            }

            if policy.decide(priority, ts, now) == FreshnessDecision::SkipUpstream {
                continue;
            }

            let key = ticket_key(&ts.seq_no);
            self.store
                .put(
                    &key,
                    &[
                        (fields::REQ_TIME, timefmt::format_datetime(&ts.req_time)),
                        (fields::CARRIER_CODE, ts.carrier_code.clone()),
                        (fields::LANGUAGE, ts.language.as_str().to_string()),
                        (fields::TRACKING_NO, ts.tracking_no.clone()),
                        (fields::CLIENT_ADDR, ts.client_addr.clone()),
                        (fields::STATUS, TicketStatus::Pending.value().to_string()),
                    ],
                    self.options.ticket_ttl,
                )
                .await?;

            self.queue.push(&topic, &key).await?;
            keys.push(key);
        }

        debug!("Pushed {} tracking-search keys to {}", keys.len(), topic);
        Ok(keys)
    }

    /// 轮询共享缓存，收集查询代理已经写回结果的查询对象。
    ///
    /// 每一轮遍历尚未完成的键；已完成的键被删除并解码，其余的留到
    /// 下一轮。达到轮询上限后仍未完成的键被放弃，由TTL回收。
    pub async fn pull(&self, mut keys: Vec<String>) -> TrackingResult<Vec<TicketSearch>> {
        let mut result = Vec::with_capacity(keys.len());

        let mut pass: u32 = 1;
        loop {
            let mut pending = Vec::new();
            for key in keys {
                let values = self.store.get(&key, &PULL_FIELDS).await?;

                let done = values
                    .as_ref()
                    .map(|vs| {
                        let status = vs[0]
                            .as_deref()
                            .and_then(|v| v.trim().parse::<i64>().ok())
                            .unwrap_or(-1);
                        status >= TicketStatus::Done.value() as i64
                    })
                    .unwrap_or(false);

                if !done {
                    pending.push(key);
                    continue;
                }

                let values = values.expect("checked above");
                self.store.delete(&key).await?;
                result.push(agent_codec::decode_ticket(&key, &values));
            }

            keys = pending;
            if keys.is_empty() || pass >= self.options.max_pull_count {
                break;
            }

            // 轮询间隔先密后疏。
            if pass <= 7 {
                tokio::time::sleep(self.options.pull_interval_early).await;
            } else {
                tokio::time::sleep(self.options.pull_interval_late).await;
            }
            pass += 1;
        }

        if !keys.is_empty() {
            debug!("{} tracking-search keys still pending, give up", keys.len());
        }

        Ok(result)
    }
}
