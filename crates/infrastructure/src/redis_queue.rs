//! 基于Redis列表的优先级队列。LPUSH入队、RPOP出队，队列内严格FIFO。

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::debug;

use tracking_domain::TicketQueue;
use tracking_errors::{TrackingError, TrackingResult};

pub struct RedisTicketQueue {
    conn: MultiplexedConnection,
}

impl RedisTicketQueue {
    /// 创建Redis队列客户端并测试连通性。
    pub async fn connect(url: &str) -> TrackingResult<Self> {
        let client = Client::open(url)
            .map_err(|e| TrackingError::queue_error(format!("cannot create redis client: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TrackingError::queue_error(format!("cannot connect to redis: {e}")))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::queue_error(format!("redis ping failed: {e}")))?;
        if pong != "PONG" {
            return Err(TrackingError::queue_error(format!(
                "unexpected ping response: {pong}"
            )));
        }
        debug!("Connected to redis ticket queue");

        Ok(Self { conn })
    }
}

#[async_trait]
impl TicketQueue for RedisTicketQueue {
    async fn length(&self, topic: &str) -> TrackingResult<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(topic)
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::queue_error(format!("redis llen failed: {e}")))
    }

    async fn push(&self, topic: &str, value: &str) -> TrackingResult<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(topic)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::queue_error(format!("redis lpush failed: {e}")))
    }

    async fn pop(&self, topic: &str) -> TrackingResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("RPOP")
            .arg(topic)
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::queue_error(format!("redis rpop failed: {e}")))
    }
}
