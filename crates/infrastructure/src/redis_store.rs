//! 基于Redis的查询对象共享缓存。
//!
//! `put`和`put_and_expire`使用事务管道，保证字段写入和过期时间设置
//! 被其它进程原子地观察到。

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;
use tracing::debug;

use tracking_domain::TicketStore;
use tracking_errors::{TrackingError, TrackingResult};

pub struct RedisTicketStore {
    conn: MultiplexedConnection,
}

impl RedisTicketStore {
    /// 创建Redis缓存客户端并测试连通性。
    pub async fn connect(url: &str) -> TrackingResult<Self> {
        let client = Client::open(url)
            .map_err(|e| TrackingError::cache_error(format!("cannot create redis client: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TrackingError::cache_error(format!("cannot connect to redis: {e}")))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::cache_error(format!("redis ping failed: {e}")))?;
        if pong != "PONG" {
            return Err(TrackingError::cache_error(format!(
                "unexpected ping response: {pong}"
            )));
        }
        debug!("Connected to redis ticket store");

        Ok(Self { conn })
    }
}

#[async_trait]
impl TicketStore for RedisTicketStore {
    async fn put(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> TrackingResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        {
            let cmd = pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                cmd.arg(*field).arg(value);
            }
            cmd.ignore();
        }
        pipe.cmd("EXPIRE").arg(key).arg(ttl.as_secs()).ignore();

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::cache_error(format!("redis put failed: {e}")))?;
        Ok(())
    }

    async fn update(&self, key: &str, fields: &[(&str, String)]) -> TrackingResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (field, value) in fields {
            pipe.cmd("HSET").arg(key).arg(*field).arg(value).ignore();
        }

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::cache_error(format!("redis update failed: {e}")))?;
        Ok(())
    }

    async fn put_and_expire(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> TrackingResult<()> {
        self.put(key, fields, ttl).await
    }

    async fn get(
        &self,
        key: &str,
        fields: &[&str],
    ) -> TrackingResult<Option<Vec<Option<String>>>> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::cache_error(format!("redis get failed: {e}")))?;

        if values.iter().all(Option::is_none) {
            Ok(None)
        } else {
            Ok(Some(values))
        }
    }

    async fn delete(&self, key: &str) -> TrackingResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| TrackingError::cache_error(format!("redis del failed: {e}")))?;
        Ok(())
    }
}
