//! 后台任务的panic防护。

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::error;

/// 启动一个后台任务，任务内的panic被捕获并记录日志，不会向外传播。
pub fn spawn_guarded<F>(task_name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        if let Err(err) = inner.await {
            if err.is_panic() {
                error!("后台任务发生panic: task={}, cause={:?}", task_name, err);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_does_not_propagate() {
        let handle = spawn_guarded("boom", async {
            panic!("boom");
        });
        // 外层任务吞掉panic后正常结束。
        assert!(handle.await.is_ok());
    }
}
