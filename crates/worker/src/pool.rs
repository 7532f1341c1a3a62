//! 查询代理轮询池。
//!
//! 固定数量的工作协程不断从优先级队列中取出查询对象的键并分发给
//! 处理器。出队严格按照 Highest → High → Low 的顺序尝试；三个队列
//! 都为空时短暂休眠。工作协程之间互相独立，没有跨协程的锁。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use tracking_domain::types::Priority;
use tracking_domain::{queue_topic, TicketQueue, ALL_PRIORITIES};
use tracking_errors::{TrackingError, TrackingResult};

/// 查询对象键的处理器。
///
/// 实现方必须保证每个被分发的键最终在共享缓存上恰好产生一次终态
/// 写回，无论成功、失败还是不支持的代理类型。
#[async_trait]
pub trait TicketHandler: Send + Sync {
    async fn handle(&self, priority: Priority, key: String);
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// 工作协程数。
    pub pool_size: usize,
    /// 队列全部为空时的休眠时长。
    pub idle_pause: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            pool_size: 50,
            idle_pause: Duration::from_millis(400),
        }
    }
}

pub struct AgentPollingPool {
    queue: Arc<dyn TicketQueue>,
    handler: Arc<dyn TicketHandler>,
    options: PoolOptions,
    shutdown_tx: broadcast::Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentPollingPool {
    pub fn new(
        queue: Arc<dyn TicketQueue>,
        handler: Arc<dyn TicketHandler>,
        options: PoolOptions,
    ) -> TrackingResult<Self> {
        if options.pool_size <= 4 {
            return Err(TrackingError::config_error(format!(
                "polling batch size should be larger than 4, but {}",
                options.pool_size
            )));
        }
        if options.pool_size > 5000 {
            return Err(TrackingError::config_error(format!(
                "polling batch size should not be larger than 5000, but {}",
                options.pool_size
            )));
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            queue,
            handler,
            options,
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// 启动所有工作协程。
    pub async fn start(&self) {
        info!("Starting agent polling pool: size={}", self.options.pool_size);

        let mut workers = self.workers.lock().await;
        for index in 0..self.options.pool_size {
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let idle_pause = self.options.idle_pause;
            let shutdown_rx = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(worker_loop(
                index,
                queue,
                handler,
                idle_pause,
                shutdown_rx,
            )));
        }
    }

    /// 停止所有工作协程并等待退出。
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("Agent polling pool stopped");
    }
}

/// 依次从不同的优先级队列中获取任务。
async fn next_key(queue: &dyn TicketQueue) -> TrackingResult<Option<(Priority, String)>> {
    for priority in ALL_PRIORITIES {
        if let Some(key) = queue.pop(&queue_topic(priority)).await? {
            return Ok(Some((priority, key)));
        }
    }
    Ok(None)
}

async fn worker_loop(
    index: usize,
    queue: Arc<dyn TicketQueue>,
    handler: Arc<dyn TicketHandler>,
    idle_pause: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("Agent worker {index} started");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            next = next_key(queue.as_ref()) => match next {
                Ok(Some((priority, key))) => {
                    // 分发在独立任务中执行，panic被捕获并记录，不会
                    // 终止工作协程。分发结束前本协程不再出队。
                    let handler = Arc::clone(&handler);
                    let dispatch = tokio::spawn(async move {
                        handler.handle(priority, key).await;
                    });
                    if let Err(err) = dispatch.await {
                        if err.is_panic() {
                            error!("Agent dispatch panicked: worker={index}, cause={err:?}");
                        }
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(idle_pause).await;
                }
                Err(err) => {
                    // 队列后端异常时记录日志并继续。
                    error!("Cannot poll ticket queues: {err}");
                    tokio::time::sleep(idle_pause).await;
                }
            }
        }
    }

    debug!("Agent worker {index} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as AsyncMutex;
    use tracking_domain::ticket_key;

    /// 记录分发顺序和并发度的处理器。
    struct RecordingHandler {
        seen: AsyncMutex<Vec<(Priority, String)>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        pause: Duration,
    }

    impl RecordingHandler {
        fn new(pause: Duration) -> Self {
            Self {
                seen: AsyncMutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                pause,
            }
        }
    }

    #[async_trait]
    impl TicketHandler for RecordingHandler {
        async fn handle(&self, priority: Priority, key: String) {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().await.push((priority, key));
            tokio::time::sleep(self.pause).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn pool_options(size: usize) -> PoolOptions {
        PoolOptions {
            pool_size: size,
            idle_pause: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_pool_size_bounds() {
        let queue = Arc::new(tracking_infrastructure::InMemoryTicketQueue::new());
        let handler = Arc::new(RecordingHandler::new(Duration::ZERO));
        assert!(AgentPollingPool::new(queue.clone(), handler.clone(), pool_options(4)).is_err());
        assert!(
            AgentPollingPool::new(queue.clone(), handler.clone(), pool_options(5001)).is_err()
        );
        assert!(AgentPollingPool::new(queue, handler, pool_options(5)).is_ok());
    }

    #[tokio::test]
    async fn test_highest_queue_drained_first() {
        let queue = Arc::new(tracking_infrastructure::InMemoryTicketQueue::new());
        for i in 0..3 {
            queue
                .push(&queue_topic(Priority::Low), &ticket_key(&format!("low-{i}")))
                .await
                .unwrap();
        }
        for i in 0..3 {
            queue
                .push(
                    &queue_topic(Priority::Highest),
                    &ticket_key(&format!("hi-{i}")),
                )
                .await
                .unwrap();
        }

        // 直接驱动出队逻辑：只要Highest队列非空，其它队列不会被碰。
        let mut order = Vec::new();
        while let Some((priority, _)) = next_key(queue.as_ref()).await.unwrap() {
            order.push(priority);
        }
        assert_eq!(
            order,
            vec![
                Priority::Highest,
                Priority::Highest,
                Priority::Highest,
                Priority::Low,
                Priority::Low,
                Priority::Low
            ]
        );
    }

    #[tokio::test]
    async fn test_popped_low_key_is_not_preempted() {
        let queue = Arc::new(tracking_infrastructure::InMemoryTicketQueue::new());
        queue
            .push(&queue_topic(Priority::Low), &ticket_key("low-1"))
            .await
            .unwrap();

        let handler = Arc::new(RecordingHandler::new(Duration::from_millis(150)));
        let pool =
            AgentPollingPool::new(queue.clone(), handler.clone(), pool_options(5)).unwrap();
        pool.start().await;

        // 等低优先级键被取走后再入队一个最高优先级键。
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue
            .push(&queue_topic(Priority::Highest), &ticket_key("hi-1"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        pool.stop().await;

        let seen = handler.seen.lock().await;
        assert_eq!(seen.len(), 2);
        // 已取走的低优先级键不会被收回，后到的最高优先级键由下一个
        // 空闲协程处理。
        assert_eq!(seen[0].0, Priority::Low);
        assert_eq!(seen[1].0, Priority::Highest);
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_pool_size() {
        let queue = Arc::new(tracking_infrastructure::InMemoryTicketQueue::new());
        for i in 0..20 {
            queue
                .push(&queue_topic(Priority::High), &ticket_key(&format!("k-{i}")))
                .await
                .unwrap();
        }

        let handler = Arc::new(RecordingHandler::new(Duration::from_millis(30)));
        let pool =
            AgentPollingPool::new(queue.clone(), handler.clone(), pool_options(5)).unwrap();
        pool.start().await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        pool.stop().await;

        assert_eq!(handler.seen.lock().await.len(), 20);
        assert!(handler.max_running.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_worker() {
        struct PanickyHandler {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TicketHandler for PanickyHandler {
            async fn handle(&self, _priority: Priority, _key: String) {
                self.calls.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            }
        }

        let queue = Arc::new(tracking_infrastructure::InMemoryTicketQueue::new());
        for i in 0..3 {
            queue
                .push(&queue_topic(Priority::Low), &ticket_key(&format!("k-{i}")))
                .await
                .unwrap();
        }

        let handler = Arc::new(PanickyHandler {
            calls: AtomicUsize::new(0),
        });
        let pool =
            AgentPollingPool::new(queue.clone(), handler.clone(), pool_options(5)).unwrap();
        pool.start().await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.stop().await;

        // 每次分发都panic，但所有键都被消费了。
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.length(&queue_topic(Priority::Low)).await.unwrap(), 0);
    }
}
