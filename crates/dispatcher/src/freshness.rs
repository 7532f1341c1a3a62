//! 数据库记录的新鲜度策略。
//!
//! 决定一个查询对象可以直接使用数据库记录，还是必须调用查询代理。

use chrono::{DateTime, Duration, Utc};

use tracking_domain::types::{Priority, TrackingResultSrc};
use tracking_domain::TicketSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessDecision {
    /// 直接使用数据库记录。
    SkipUpstream,
    /// 调用查询代理。
    CallUpstream,
}

#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    /// 有效更新窗口。
    fresh_full: Duration,
    /// 空单号的有效更新窗口。
    fresh_empty: Duration,
}

impl FreshnessPolicy {
    pub fn new(fresh_full_h: i64, fresh_empty_h: i64) -> Self {
        Self {
            fresh_full: Duration::hours(fresh_full_h),
            fresh_empty: Duration::hours(fresh_empty_h),
        }
    }

    /// 按顺序应用规则，第一条命中的规则决定结果。
    pub fn decide(
        &self,
        priority: Priority,
        ts: &TicketSearch,
        now: DateTime<Utc>,
    ) -> FreshnessDecision {
        // 最高优先级必须调用查询代理。
        if priority == Priority::Highest {
            return FreshnessDecision::CallUpstream;
        }

        // 数据库中没有记录，或者记录不包含事件。
        if ts.src != TrackingResultSrc::Db || ts.events.is_empty() {
            return FreshnessDecision::CallUpstream;
        }

        // 已妥投的运单不会再变化。
        if ts.done {
            return FreshnessDecision::SkipUpstream;
        }

        let update_time = match ts.update_time {
            Some(t) => t,
            None => return FreshnessDecision::CallUpstream,
        };

        if update_time > now - self.fresh_full {
            return FreshnessDecision::SkipUpstream;
        }

        if ts.events.is_empty() && update_time > now - self.fresh_empty {
            return FreshnessDecision::SkipUpstream;
        }

        FreshnessDecision::CallUpstream
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(2, 8)
    }
}
