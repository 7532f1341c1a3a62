//! 查询对象在请求侧和查询代理之间交换的共享区抽象。
//!
//! 共享区由一个带TTL的键值存储（查询对象的字段）和三个优先级FIFO队列
//! （查询对象的键）组成。任何redis兼容的后端都可以满足此契约，测试中
//! 使用内存实现。

use async_trait::async_trait;
use std::time::Duration;
use tracking_errors::TrackingResult;

use crate::types::Priority;

/// 缓存中的查询对象的Key的前缀。
pub const TICKET_KEY_PREFIX: &str = "TRACKING_SEARCH";
/// 查询对象队列Key的前缀。
pub const TICKET_QUEUE_KEY: &str = "TRACKING_QUEUE";

/// 查询对象的字段名。
pub mod fields {
    pub const STATUS: &str = "status";
    pub const REQ_TIME: &str = "reqTime";
    pub const CARRIER_CODE: &str = "carrierCode";
    pub const LANGUAGE: &str = "language";
    pub const TRACKING_NO: &str = "trackingNo";
    pub const CLIENT_ADDR: &str = "clientAddr";
    pub const AGENT_SRC: &str = "agentSrc";
    pub const AGENT_NAME: &str = "agentName";
    pub const AGENT_ERR: &str = "agentErr";
    pub const AGENT_START_TIME: &str = "agentStartTime";
    pub const AGENT_END_TIME: &str = "agentEndTime";
    pub const AGENT_RESULT: &str = "agentResult";
}

/// 根据流水号构造查询对象的缓存键。
pub fn ticket_key(seq_no: &str) -> String {
    format!("{TICKET_KEY_PREFIX}${seq_no}")
}

/// 从缓存键中取出流水号。
pub fn seq_no_of_key(key: &str) -> &str {
    &key[TICKET_KEY_PREFIX.len() + 1..]
}

/// 根据优先级构造队列主题。
pub fn queue_topic(priority: Priority) -> String {
    format!("{TICKET_QUEUE_KEY}${}", priority.as_str())
}

/// 查询对象的键值存储。
///
/// 每次`put`必须被`get`原子地观察到，不允许出现字段级的中间状态。
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// 替换键的全部字段并设置过期时间。
    async fn put(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> TrackingResult<()>;

    /// 合并字段，不改变过期时间。
    async fn update(&self, key: &str, fields: &[(&str, String)]) -> TrackingResult<()>;

    /// 原子地合并字段并重置过期时间。
    async fn put_and_expire(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> TrackingResult<()>;

    /// 读取指定字段。键不存在或者所有字段都为空时返回`None`。
    /// 返回值和请求的字段一一对应。
    async fn get(
        &self,
        key: &str,
        fields: &[&str],
    ) -> TrackingResult<Option<Vec<Option<String>>>>;

    /// 删除键。幂等。
    async fn delete(&self, key: &str) -> TrackingResult<()>;
}

/// 查询对象的FIFO队列。队列内严格FIFO，队列之间没有顺序约束。
#[async_trait]
pub trait TicketQueue: Send + Sync {
    /// 获取队列的当前长度。
    async fn length(&self, topic: &str) -> TrackingResult<i64>;

    /// 将值入队（队尾）。返回队列的新长度。
    async fn push(&self, topic: &str, value: &str) -> TrackingResult<i64>;

    /// 将值出队（队头）。队列为空时返回`None`。
    async fn pop(&self, topic: &str) -> TrackingResult<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_key_round_trip() {
        let key = ticket_key("142385066352152576");
        assert_eq!(key, "TRACKING_SEARCH$142385066352152576");
        assert_eq!(seq_no_of_key(&key), "142385066352152576");
    }

    #[test]
    fn test_queue_topics() {
        assert_eq!(queue_topic(Priority::Highest), "TRACKING_QUEUE$Highest");
        assert_eq!(queue_topic(Priority::Low), "TRACKING_QUEUE$Low");
    }
}
