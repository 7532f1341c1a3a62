//! 内存版的查询对象缓存和队列。
//!
//! 语义与Redis实现对齐（TTL、原子可见性、FIFO），用于测试和
//! 无外部依赖的嵌入式运行。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use tracking_domain::{TicketQueue, TicketStore};
use tracking_errors::TrackingResult;

#[derive(Debug)]
struct Entry {
    fields: HashMap<String, String>,
    /// `None`表示永不过期（和redis中未设置TTL的键一致）。
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|t| t <= Instant::now()).unwrap_or(false)
    }
}

/// 内存版查询对象缓存。
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn purge_expired(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired());
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn put(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> TrackingResult<()> {
        let mut entries = self.entries.write().await;
        let fields = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.clone()))
            .collect();
        entries.insert(
            key.to_string(),
            Entry {
                fields,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn update(&self, key: &str, fields: &[(&str, String)]) -> TrackingResult<()> {
        self.purge_expired().await;
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            fields: HashMap::new(),
            expires_at: None,
        });
        for (f, v) in fields {
            entry.fields.insert(f.to_string(), v.clone());
        }
        Ok(())
    }

    async fn put_and_expire(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> TrackingResult<()> {
        self.purge_expired().await;
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            fields: HashMap::new(),
            expires_at: None,
        });
        for (f, v) in fields {
            entry.fields.insert(f.to_string(), v.clone());
        }
        entry.expires_at = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn get(
        &self,
        key: &str,
        fields: &[&str],
    ) -> TrackingResult<Option<Vec<Option<String>>>> {
        self.purge_expired().await;
        let entries = self.entries.read().await;
        match entries.get(key) {
            None => Ok(None),
            Some(entry) => {
                let values: Vec<Option<String>> = fields
                    .iter()
                    .map(|f| entry.fields.get(*f).cloned())
                    .collect();
                if values.iter().all(Option::is_none) {
                    Ok(None)
                } else {
                    Ok(Some(values))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> TrackingResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// 内存版优先级队列。
#[derive(Debug, Default)]
pub struct InMemoryTicketQueue {
    queues: Arc<RwLock<HashMap<String, VecDeque<String>>>>,
}

impl InMemoryTicketQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketQueue for InMemoryTicketQueue {
    async fn length(&self, topic: &str) -> TrackingResult<i64> {
        let queues = self.queues.read().await;
        Ok(queues.get(topic).map(|q| q.len() as i64).unwrap_or(0))
    }

    async fn push(&self, topic: &str, value: &str) -> TrackingResult<i64> {
        let mut queues = self.queues.write().await;
        let queue = queues.entry(topic.to_string()).or_default();
        queue.push_back(value.to_string());
        Ok(queue.len() as i64)
    }

    async fn pop(&self, topic: &str) -> TrackingResult<Option<String>> {
        let mut queues = self.queues.write().await;
        Ok(queues.get_mut(topic).and_then(|q| q.pop_front()))
    }
}
