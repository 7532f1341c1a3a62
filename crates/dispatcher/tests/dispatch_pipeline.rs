//! 调度管线的端到端测试。
//!
//! 使用内存共享区、仓储mock和本地axum服务模拟的查询代理，覆盖
//! 纯缓存命中、代理抓取、解析失败、队列过载和时钟回拨等场景。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use tracking_common::{sign, SeqNoGenerator, SeqNoSource};
use tracking_dispatcher::{
    DispatchOptions, OrderQuery, RendezvousOptions, TrackingDispatchService, TrackingsQuery,
};
use tracking_domain::types::{LangId, Priority};
use tracking_domain::{queue_topic, ticket_key, TicketQueue, TicketStore};
use tracking_errors::{TrackingError, TrackingResult};
use tracking_infrastructure::{InMemoryTicketQueue, InMemoryTicketStore};
use tracking_testing_utils::builders::{
    carrier, crawler_agent, delivered_rule, event, stored_result,
};
use tracking_testing_utils::{
    MockAgentRepository, MockCarrierRepository, MockMatchRuleRepository,
    MockTrackingLogRepository, MockTrackingResultRepository,
};
use tracking_worker::{AgentInvoker, AgentPollingPool, InvokerOptions, PoolOptions, TicketHandler};

struct TestPipeline {
    queue: Arc<InMemoryTicketQueue>,
    results: Arc<MockTrackingResultRepository>,
    logs: Arc<MockTrackingLogRepository>,
    agents: Arc<MockAgentRepository>,
    service: TrackingDispatchService,
    pool: AgentPollingPool,
}

fn fast_options() -> DispatchOptions {
    DispatchOptions {
        rendezvous: RendezvousOptions {
            max_queue_size: 10_000,
            max_pull_count: 20,
            ticket_ttl: Duration::from_secs(5),
            pull_interval_early: Duration::from_millis(25),
            pull_interval_late: Duration::from_millis(25),
        },
        ..DispatchOptions::default()
    }
}

fn build_pipeline(options: DispatchOptions, seq_no: Arc<dyn SeqNoSource>) -> TestPipeline {
    let store = Arc::new(InMemoryTicketStore::new());
    let queue = Arc::new(InMemoryTicketQueue::new());
    let carriers = Arc::new(MockCarrierRepository::with_carriers(vec![carrier(1, "dhl")]));
    let results = Arc::new(MockTrackingResultRepository::new());
    let rules = Arc::new(MockMatchRuleRepository::with_rules(vec![delivered_rule(
        1,
        "Delivered",
    )]));
    let logs = Arc::new(MockTrackingLogRepository::new());
    let agents = Arc::new(MockAgentRepository::new());

    let service = TrackingDispatchService::new(
        store.clone() as Arc<dyn TicketStore>,
        queue.clone() as Arc<dyn TicketQueue>,
        seq_no,
        carriers.clone(),
        results.clone(),
        rules,
        logs.clone(),
        options,
    );

    let invoker = Arc::new(AgentInvoker::new(
        store.clone() as Arc<dyn TicketStore>,
        agents.clone(),
        InvokerOptions::default(),
    ));
    let pool = AgentPollingPool::new(
        queue.clone() as Arc<dyn TicketQueue>,
        invoker as Arc<dyn TicketHandler>,
        PoolOptions {
            pool_size: 5,
            idle_pause: Duration::from_millis(20),
        },
    )
    .unwrap();

    TestPipeline {
        queue,
        results,
        logs,
        agents,
        service,
        pool,
    }
}

fn pipeline() -> TestPipeline {
    build_pipeline(fast_options(), Arc::new(SeqNoGenerator::new()))
}

fn query(priority: Priority, tracking_nos: &[&str]) -> TrackingsQuery {
    TrackingsQuery {
        carrier_code: "DHL".to_string(),
        client_id: String::new(),
        timestamp: 0,
        language: LangId::En,
        priority,
        token: String::new(),
        orders: tracking_nos
            .iter()
            .map(|t| OrderQuery {
                tracking_no: t.to_string(),
                postcode: String::new(),
                dest: String::new(),
                date: String::new(),
            })
            .collect(),
    }
}

async fn spawn_agent_stub(reply: &'static str) -> SocketAddr {
    let router = axum::Router::new().route(
        "/track",
        axum::routing::get(move || async move { reply }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_done_record_served_from_store_without_enqueue() {
    let p = pipeline();
    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "A1",
        &[event(now - chrono::Duration::minutes(10), "Delivered", "LAX")],
        now - chrono::Duration::minutes(10),
        true,
    ));

    let replies = p
        .service
        .query_trackings(query(Priority::Low, &["a1"]), "127.0.0.1".into())
        .await
        .unwrap();

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tracking_no, "A1");
    assert_eq!(replies[0].state, 1);
    assert!(replies[0].cached);
    assert!(replies[0].delivered);

    // 新鲜度策略：已妥投的记录不再入队。
    for priority in [Priority::Highest, Priority::High, Priority::Low] {
        assert_eq!(p.queue.length(&queue_topic(priority)).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_highest_priority_enqueues_despite_done_record() {
    let p = pipeline();
    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "A1",
        &[event(now, "Delivered", "LAX")],
        now,
        true,
    ));

    // 没有查询代理，抓取会以错误收尾；这里只验证入队行为。
    p.pool.start().await;
    let replies = p
        .service
        .query_trackings(query(Priority::Highest, &["A1"]), "127.0.0.1".into())
        .await
        .unwrap();
    p.pool.stop().await;

    // 最高优先级强制走了查询代理路径，失败后回退到数据库记录。
    assert_eq!(replies.len(), 1);
    assert!(replies[0].cached);
}

#[tokio::test]
async fn test_fetch_path_delivers_and_persists() {
    let addr = spawn_agent_stub(
        r#"{"code":1,"trackingEventList":[{"date":"2024-01-02 03:04:05","place":"X","details":"Delivered to recipient"}],"trackingNo":"A1"}"#,
    )
    .await;

    let p = pipeline();
    p.agents.set_crawler_agent(crawler_agent(
        1,
        "go-x",
        &format!("http://{addr}/track"),
        tracking_domain::CrawlerKind::Go,
    ));
    p.pool.start().await;

    let replies = p
        .service
        .query_trackings(query(Priority::High, &["A1"]), "127.0.0.1".into())
        .await
        .unwrap();

    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.state, 1);
    assert!(reply.delivered);
    assert_eq!(reply.delivery_date, "2024-01-02 03:04:05");
    assert_eq!(reply.destination, "X");
    assert!(!reply.cached);
    assert_eq!(reply.events.len(), 1);
    assert_eq!(reply.events[0].state, 3);

    // 持久化在关键路径之外，稍等片刻。
    tokio::time::sleep(Duration::from_millis(200)).await;
    let saved = p.results.saved_results();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].done);
    assert_eq!(saved[0].tracking_no, "A1");

    // 相同内容再查一次：指纹去重，不产生第二条记录。
    let _ = p
        .service
        .query_trackings(query(Priority::High, &["A1"]), "127.0.0.1".into())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(p.results.saved_results().len(), 1);

    p.pool.stop().await;
}

#[tokio::test]
async fn test_parse_failure_yields_error_reply_without_tracking_row() {
    let addr = spawn_agent_stub("not json").await;

    let p = pipeline();
    p.agents.set_crawler_agent(crawler_agent(
        1,
        "go-x",
        &format!("http://{addr}/track"),
        tracking_domain::CrawlerKind::Go,
    ));
    p.pool.start().await;

    let replies = p
        .service
        .query_trackings(query(Priority::High, &["A1"]), "127.0.0.1".into())
        .await
        .unwrap();
    p.pool.stop().await;

    assert_eq!(replies[0].state, 0);
    assert!(!replies[0].message.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(p.results.saved_results().is_empty());

    // 审计日志仍然有一条失败记录。
    let entries = p.logs.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result_status, 0);
    assert!(entries[0].result_note.contains("无法解析"));
}

#[tokio::test]
async fn test_overloaded_queue_suppresses_upstream_but_serves_store() {
    let mut options = fast_options();
    options.rendezvous.max_queue_size = 5;
    let p = build_pipeline(options, Arc::new(SeqNoGenerator::new()));

    // 队列里已有4个键，批次2个再入队就会超过上限。
    for i in 0..4 {
        p.queue
            .push(&queue_topic(Priority::Low), &ticket_key(&format!("x-{i}")))
            .await
            .unwrap();
    }

    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "A1",
        &[event(now, "Delivered", "LAX")],
        now,
        true,
    ));

    let replies = p
        .service
        .query_trackings(query(Priority::Low, &["A1", "B2"]), "127.0.0.1".into())
        .await
        .unwrap();

    assert_eq!(replies.len(), 2);
    // 数据库里有的仍然返回。
    assert_eq!(replies[0].state, 1);
    assert!(replies[0].cached);
    // 其余的凭空构造为超时。
    assert_eq!(replies[1].state, 0);
    assert_eq!(replies[1].message, "Timeout");

    // 整批的上游路径被抑制，队列长度不变。
    assert_eq!(p.queue.length(&queue_topic(Priority::Low)).await.unwrap(), 4);
}

/// 第一次调用返回时钟回拨错误，之后委托给真实生成器。
struct FlakySeqNoSource {
    inner: SeqNoGenerator,
    failed: AtomicBool,
}

impl SeqNoSource for FlakySeqNoSource {
    fn next(&self) -> TrackingResult<String> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(TrackingError::ClockBackwards { behind_ms: 7 });
        }
        self.inner.next()
    }
}

#[tokio::test]
async fn test_clock_backwards_skips_order_but_batch_continues() {
    let seq_no = Arc::new(FlakySeqNoSource {
        inner: SeqNoGenerator::new(),
        failed: AtomicBool::new(false),
    });
    let p = build_pipeline(fast_options(), seq_no);

    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "B2",
        &[event(now, "Delivered", "LAX")],
        now,
        true,
    ));

    let replies = p
        .service
        .query_trackings(query(Priority::Low, &["A1", "B2"]), "127.0.0.1".into())
        .await
        .unwrap();

    assert_eq!(replies.len(), 2);
    // 第一个运单被跳过，返回凭空构造的超时记录。
    assert_eq!(replies[0].tracking_no, "A1");
    assert_eq!(replies[0].message, "Timeout");
    // 其余运单正常返回。
    assert_eq!(replies[1].tracking_no, "B2");
    assert_eq!(replies[1].state, 1);
}

#[tokio::test]
async fn test_response_preserves_request_order_with_duplicates() {
    let p = pipeline();
    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "B2",
        &[event(now, "Delivered", "LAX")],
        now,
        true,
    ));

    // 空单号被丢弃；重复单号原样保留。
    let replies = p
        .service
        .query_trackings(
            query(Priority::Low, &["A1", "", "B2", "A1"]),
            "127.0.0.1".into(),
        )
        .await
        .unwrap();

    let order: Vec<&str> = replies.iter().map(|r| r.tracking_no.as_str()).collect();
    assert_eq!(order, vec!["A1", "B2", "A1"]);
}

#[tokio::test]
async fn test_validation_rejects_bad_batches() {
    let p = pipeline();

    let err = p
        .service
        .query_trackings(query(Priority::Low, &[]), "127.0.0.1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));

    let mut q = query(Priority::Low, &["A1"]);
    q.carrier_code = "  ".to_string();
    let err = p
        .service
        .query_trackings(q, "127.0.0.1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));

    let nos: Vec<String> = (0..31).map(|i| format!("T{i}")).collect();
    let no_refs: Vec<&str> = nos.iter().map(String::as_str).collect();
    let err = p
        .service
        .query_trackings(query(Priority::Low, &no_refs), "127.0.0.1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::Validation(_)));
}

#[tokio::test]
async fn test_md5_token_auth() {
    let mut options = fast_options();
    options
        .auth_clients
        .insert("cne".to_string(), "secret-1".to_string());
    let p = build_pipeline(options, Arc::new(SeqNoGenerator::new()));

    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "A1",
        &[event(now, "Delivered", "LAX")],
        now,
        true,
    ));

    // 错误的token被拒绝。
    let mut q = query(Priority::Low, &["A1"]);
    q.client_id = "CNE".to_string();
    q.timestamp = Utc::now().timestamp();
    q.token = "bad".to_string();
    let err = p
        .service
        .query_trackings(q, "127.0.0.1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::Auth(_)));

    // 过期的时间戳被拒绝。
    let mut q = query(Priority::Low, &["A1"]);
    q.client_id = "cne".to_string();
    q.timestamp = Utc::now().timestamp() - 60;
    q.token = sign::sign_with_md5(&["cne", &q.timestamp.to_string(), "secret-1"]);
    let err = p
        .service
        .query_trackings(q, "127.0.0.1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::Auth(_)));

    // 正确的token放行。
    let mut q = query(Priority::Low, &["A1"]);
    q.client_id = "cne".to_string();
    q.timestamp = Utc::now().timestamp();
    q.token = sign::sign_with_md5(&["cne", &q.timestamp.to_string(), "secret-1"]);
    let replies = p
        .service
        .query_trackings(q, "127.0.0.1".into())
        .await
        .unwrap();
    assert_eq!(replies[0].state, 1);
}

#[tokio::test]
async fn test_audit_log_written_for_cached_results() {
    let p = pipeline();
    let now = Utc::now();
    p.results.seed(stored_result(
        "dhl",
        LangId::En,
        "A1",
        &[event(now, "Delivered", "LAX")],
        now,
        true,
    ));

    let _ = p
        .service
        .query_trackings(query(Priority::Low, &["A1"]), "10.1.2.3".into())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let entries = p.logs.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result_status, 1);
    assert_eq!(entries[0].host, "10.1.2.3");
    assert!(entries[0].result_note.contains("已妥投"));
}
