//! 查询代理的选择和调用。
//!
//! 每个被分发的键：读取查询对象的字段，优先选择API查询代理，其次按
//! priority选择爬虫查询代理，通过HTTP调用后把结果写回共享缓存。任何
//! 分支都保证在共享缓存上产生一次终态写回。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use tracking_common::timefmt;
use tracking_domain::ports::rendezvous::{fields, seq_no_of_key};
use tracking_domain::types::{LangId, Priority, TicketStatus, TrackingResultSrc};
use tracking_domain::{
    AgentRepository, ApiAgentInfo, ApiAgentParam, CrawlerAgentInfo, CrawlerKind, TicketStore,
};
use tracking_errors::{TrackingError, TrackingResult};

use crate::pool::TicketHandler;

/// 默认的查询代理调用超时（秒）。
const DEFAULT_AGENT_TIMEOUT_S: u64 = 25;

/// 一次查询代理调用的计时和原始返回。
#[derive(Debug, Default, Clone)]
pub struct AgentOutcome {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: String,
}

#[derive(Debug, Clone)]
pub struct InvokerOptions {
    /// 查询代理写回结果后的缓存存活时间。
    pub result_ttl: Duration,
}

impl Default for InvokerOptions {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(10),
        }
    }
}

pub struct AgentInvoker {
    store: Arc<dyn TicketStore>,
    agents: Arc<dyn AgentRepository>,
    http: reqwest::Client,
    options: InvokerOptions,
}

impl AgentInvoker {
    pub fn new(
        store: Arc<dyn TicketStore>,
        agents: Arc<dyn AgentRepository>,
        options: InvokerOptions,
    ) -> Self {
        Self {
            store,
            agents,
            http: reqwest::Client::new(),
            options,
        }
    }

    async fn dispatch(&self, key: &str) {
        let seq_no = seq_no_of_key(key).to_string();

        let values = match self
            .store
            .get(
                key,
                &[
                    fields::REQ_TIME,
                    fields::CARRIER_CODE,
                    fields::LANGUAGE,
                    fields::TRACKING_NO,
                ],
            )
            .await
        {
            Err(err) => {
                error!("Cannot get tracking-search(key={key}) from cache. cause={err}");
                self.finalize(
                    key,
                    TrackingResultSrc::Unknown,
                    "",
                    &format!("$缓存不可用(seq-no={seq_no})$"),
                    &AgentOutcome::default(),
                )
                .await;
                return;
            }
            Ok(None) => {
                error!("Cannot get tracking-search(key={key}) from cache");
                self.finalize(
                    key,
                    TrackingResultSrc::Unknown,
                    "",
                    &format!("$缓存丢失查询对象(seq-no={seq_no})$"),
                    &AgentOutcome::default(),
                )
                .await;
                return;
            }
            Ok(Some(values)) => values,
        };

        let text = |i: usize| values[i].clone().unwrap_or_default();
        let req_time = timefmt::parse_datetime(&text(0));
        let carrier_code = text(1);
        let language = LangId::parse(&text(2)).unwrap_or_else(|_| {
            warn!("Illegal language: {:?}", values[2]);
            LangId::En
        });
        let tracking_no = text(3);

        // 尝试找API，如果找不到API，那么找爬虫。
        let api_agent = match self.agents.find_api_agent(&carrier_code, req_time).await {
            Ok(api_agent) => api_agent,
            Err(err) => {
                error!("Cannot query api agent for carrier[{carrier_code}]: {err}");
                self.finalize(
                    key,
                    TrackingResultSrc::Unknown,
                    "",
                    &format!("$查询代理元数据不可用(carrier-code={carrier_code})$"),
                    &AgentOutcome::default(),
                )
                .await;
                return;
            }
        };

        if let Some(api) = api_agent {
            let params = match self.agents.find_api_params(api.id).await {
                Ok(params) => params,
                Err(err) => {
                    warn!("Cannot query api params for agent {}: {err}", api.name);
                    Vec::new()
                }
            };
            self.call_api(key, &api, &params, &seq_no, &carrier_code, language, &tracking_no)
                .await;
            return;
        }

        match self.agents.find_crawler_agent(&carrier_code, req_time).await {
            Ok(Some(crawler)) => {
                self.call_crawler(key, &crawler, &seq_no, &carrier_code, language, &tracking_no)
                    .await;
            }
            Ok(None) => {
                warn!("Cannot find suitable agent for carrier[{carrier_code}] at {req_time}");
                self.finalize(
                    key,
                    TrackingResultSrc::Unknown,
                    "",
                    &format!("$没有匹配到查询代理(carrier-code={carrier_code})$"),
                    &AgentOutcome::default(),
                )
                .await;
            }
            Err(err) => {
                error!("Cannot query crawler agent for carrier[{carrier_code}]: {err}");
                self.finalize(
                    key,
                    TrackingResultSrc::Unknown,
                    "",
                    &format!("$查询代理元数据不可用(carrier-code={carrier_code})$"),
                    &AgentOutcome::default(),
                )
                .await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_api(
        &self,
        key: &str,
        api: &ApiAgentInfo,
        params: &[ApiAgentParam],
        seq_no: &str,
        carrier_code: &str,
        language: LangId,
        tracking_no: &str,
    ) {
        self.mark_in_flight(key).await;

        let url = format!("{}/fetchTrackInfoList", api.url);
        let (payload, timeout_s) = build_api_payload(params, language, tracking_no);

        debug!(
            "API processing {{seq-no: {seq_no}, carrier-code: {carrier_code}, tracking-no: {tracking_no}}} from {url} [data={payload}]"
        );

        let start_time = Utc::now();
        match self.post_json(&url, &payload, timeout_s).await {
            Ok(body) => {
                let outcome = AgentOutcome {
                    start_time: Some(start_time),
                    end_time: Some(Utc::now()),
                    result: normalize_agent_text(&body),
                };
                self.finalize(key, TrackingResultSrc::Api, &api.name, "", &outcome)
                    .await;
            }
            Err(err) => {
                // 查询代理不可用。
                warn!(
                    "Cannot call api {{api-name={}, carrier-code={carrier_code}, language={}, tracking-no={tracking_no} seq-no={seq_no}}}. cause={err}",
                    api.name,
                    language.as_str()
                );
                self.finalize(
                    key,
                    TrackingResultSrc::Crawler,
                    &api.name,
                    &format!(
                        "$调用API失败(carrier-code={carrier_code},api-name={})$",
                        api.name
                    ),
                    &AgentOutcome::default(),
                )
                .await;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_crawler(
        &self,
        key: &str,
        crawler: &CrawlerAgentInfo,
        seq_no: &str,
        carrier_code: &str,
        language: LangId,
        tracking_no: &str,
    ) {
        self.mark_in_flight(key).await;

        match &crawler.kind {
            CrawlerKind::Python => {
                match self
                    .call_crawler_by_python(crawler, seq_no, carrier_code, tracking_no)
                    .await
                {
                    Ok(outcome) => {
                        self.finalize(key, TrackingResultSrc::Crawler, &crawler.name, "", &outcome)
                            .await;
                    }
                    Err(err) => {
                        warn!("Cannot call python crawler. cause={err}");
                        self.finalize(
                            key,
                            TrackingResultSrc::Crawler,
                            &crawler.name,
                            &format!(
                                "$调用Python爬虫失败(carrier-code={carrier_code},crawler-name={})$",
                                crawler.name
                            ),
                            &AgentOutcome::default(),
                        )
                        .await;
                    }
                }
            }
            CrawlerKind::Go => {
                match self
                    .call_crawler_by_golang(crawler, seq_no, carrier_code, tracking_no)
                    .await
                {
                    Ok(outcome) => {
                        self.finalize(key, TrackingResultSrc::Crawler, &crawler.name, "", &outcome)
                            .await;
                    }
                    Err(err) => {
                        warn!("Cannot call golang crawler. cause={err}");
                        self.finalize(
                            key,
                            TrackingResultSrc::Crawler,
                            &crawler.name,
                            &format!(
                                "$调用GO爬虫失败(carrier-code={carrier_code},crawler-name={})$",
                                crawler.name
                            ),
                            &AgentOutcome::default(),
                        )
                        .await;
                    }
                }
            }
            CrawlerKind::Other(kind) => {
                warn!("Unsupported crawler type: {kind}");
                self.finalize(
                    key,
                    TrackingResultSrc::Crawler,
                    &crawler.name,
                    &format!(
                        "$不支持的爬虫类型(carrier-code={carrier_code},crawler-name={},crawler-type={kind})$",
                        crawler.name
                    ),
                    &AgentOutcome::default(),
                )
                .await;
            }
        }
    }

    /// 调用Python查询代理。固定使用POST方式。
    async fn call_crawler_by_python(
        &self,
        crawler: &CrawlerAgentInfo,
        seq_no: &str,
        carrier_code: &str,
        tracking_no: &str,
    ) -> TrackingResult<AgentOutcome> {
        let url = format!("{}/fetchTrackInfoList", crawler.url);
        let payload = build_python_payload(crawler, tracking_no);

        debug!(
            "Crawler by python processing {{seq-no: {seq_no}, carrier-code: {carrier_code}, tracking-no: {tracking_no}}} from {url} [data={payload}]"
        );

        let start_time = Utc::now();
        let body = self
            .post_json(&url, &payload, agent_timeout_s(crawler.req_timeout))
            .await?;
        Ok(AgentOutcome {
            start_time: Some(start_time),
            end_time: Some(Utc::now()),
            result: normalize_agent_text(&body),
        })
    }

    /// 调用Go查询代理。固定使用GET方式。
    async fn call_crawler_by_golang(
        &self,
        crawler: &CrawlerAgentInfo,
        seq_no: &str,
        carrier_code: &str,
        tracking_no: &str,
    ) -> TrackingResult<AgentOutcome> {
        let url = golang_crawler_url(&crawler.url, tracking_no);

        debug!(
            "Crawler by golang processing {{seq-no: {seq_no}, carrier-code: {carrier_code}, tracking-no: {tracking_no}}} from {url}"
        );

        let start_time = Utc::now();
        let body = self
            .get_text(&url, agent_timeout_s(crawler.req_timeout))
            .await?;
        Ok(AgentOutcome {
            start_time: Some(start_time),
            end_time: Some(Utc::now()),
            result: normalize_agent_text(&body),
        })
    }

    /// 标记查询对象已受理。
    async fn mark_in_flight(&self, key: &str) {
        if let Err(err) = self
            .store
            .update(
                key,
                &[(fields::STATUS, TicketStatus::InFlight.value().to_string())],
            )
            .await
        {
            warn!("Cannot mark tracking-search(key={key}) in flight: {err}");
        }
    }

    /// 写回终态。每个被分发的键恰好调用一次。
    async fn finalize(
        &self,
        key: &str,
        src: TrackingResultSrc,
        agent_name: &str,
        agent_err: &str,
        outcome: &AgentOutcome,
    ) {
        let format_opt = |t: &Option<DateTime<Utc>>| {
            t.map(|t| timefmt::format_datetime(&t)).unwrap_or_default()
        };

        let result = self
            .store
            .put_and_expire(
                key,
                &[
                    (fields::STATUS, TicketStatus::Done.value().to_string()),
                    (fields::AGENT_SRC, src.value().to_string()),
                    (fields::AGENT_NAME, agent_name.to_string()),
                    (fields::AGENT_ERR, agent_err.to_string()),
                    (fields::AGENT_START_TIME, format_opt(&outcome.start_time)),
                    (fields::AGENT_END_TIME, format_opt(&outcome.end_time)),
                    (fields::AGENT_RESULT, outcome.result.clone()),
                ],
                self.options.result_ttl,
            )
            .await;

        if let Err(err) = result {
            error!("Cannot write agent result back (key={key}): {err}");
        }
    }

    async fn post_json(&self, url: &str, body: &Value, timeout_s: u64) -> TrackingResult<String> {
        let rsp = self
            .http
            .post(url)
            .timeout(Duration::from_secs(timeout_s))
            .json(body)
            .send()
            .await
            .map_err(|e| TrackingError::Network(e.to_string()))?;
        rsp.text()
            .await
            .map_err(|e| TrackingError::Network(e.to_string()))
    }

    async fn get_text(&self, url: &str, timeout_s: u64) -> TrackingResult<String> {
        let rsp = self
            .http
            .get(url)
            .timeout(Duration::from_secs(timeout_s))
            .send()
            .await
            .map_err(|e| TrackingError::Network(e.to_string()))?;
        rsp.text()
            .await
            .map_err(|e| TrackingError::Network(e.to_string()))
    }
}

#[async_trait]
impl TicketHandler for AgentInvoker {
    async fn handle(&self, _priority: Priority, key: String) {
        self.dispatch(&key).await;
    }
}

fn agent_timeout_s(req_timeout: i32) -> u64 {
    if req_timeout > 0 {
        req_timeout as u64
    } else {
        DEFAULT_AGENT_TIMEOUT_S
    }
}

/// 组装API查询代理的请求体。
///
/// 保留参数放在顶层；其余参数放入`reqData`子对象，其JSON字符串再被
/// 赋给顶层的`reqData`字段。参数值中的`{lan}`被替换为语言的小写名。
/// 返回请求体和调用超时（秒）。
pub fn build_api_payload(
    params: &[ApiAgentParam],
    language: LangId,
    tracking_no: &str,
) -> (Value, u64) {
    let mut data = serde_json::Map::new();
    data.insert("trackingNo".to_string(), json!(tracking_no));

    let mut req_data = serde_json::Map::new();
    let mut timeout_s = DEFAULT_AGENT_TIMEOUT_S;

    for param in params {
        match param.field_name.as_str() {
            "reqUrl" | "siteAnalyzedName" | "siteCrawlingName" | "reqProxy" => {
                data.insert(param.field_name.clone(), json!(param.field_value));
            }
            "reqTimeout" => {
                let t: u64 = param
                    .field_value
                    .trim()
                    .parse()
                    .unwrap_or(DEFAULT_AGENT_TIMEOUT_S);
                timeout_s = t;
                data.insert("reqTimeout".to_string(), json!(t));
            }
            _ => {
                let value = if param.field_value.contains("{lan}") {
                    param
                        .field_value
                        .replace("{lan}", &language.as_str().to_lowercase())
                } else {
                    param.field_value.clone()
                };
                req_data.insert(param.field_name.clone(), json!(value));
            }
        }
    }

    data.insert(
        "reqData".to_string(),
        json!(Value::Object(req_data).to_string()),
    );

    (Value::Object(data), timeout_s)
}

/// 组装Python爬虫查询代理的请求体。
pub fn build_python_payload(crawler: &CrawlerAgentInfo, tracking_no: &str) -> Value {
    json!({
        "infoId": crawler.id.to_string(),
        "reqUrl": crawler.target_url,
        "reqMethod": crawler.req_http_method,
        "reqVerify": crawler.verify as i32,
        "reqJson": crawler.json as i32,
        "reqProxy": crawler.req_proxy,
        "reqTimeout": crawler.req_timeout,
        "siteEncrypt": crawler.site_encrypt,
        "siteCrawlingName": crawler.site_crawling_name,
        "siteAnalyzedName": crawler.site_analyzed_name,
        "trackingFieldType": crawler.tracking_field_type,
        "trackingFieldName": crawler.tracking_field_name,
        "reqHeaders": crawler.req_http_headers,
        "reqData": crawler.req_http_body,
        "trackingNo": tracking_no,
    })
}

/// 组装Go爬虫查询代理的URL。已带查询串的URL用`&`追加。
pub fn golang_crawler_url(url: &str, tracking_no: &str) -> String {
    if url.contains('?') {
        format!("{url}&nums={tracking_no}")
    } else {
        format!("{url}?nums={tracking_no}")
    }
}

/// 归一化查询代理返回的原始文本。
///
/// Python查询代理有时输出python字面量格式的JSON（单引号和`None`），
/// 归一化对所有代理类别无条件执行。
pub fn normalize_agent_text(text: &str) -> String {
    text.replace('\'', "\"").replace("None", "\"\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, value: &str) -> ApiAgentParam {
        ApiAgentParam {
            field_type: 0,
            field_name: name.into(),
            field_value: value.into(),
            is_head: false,
            is_body: true,
            need_encrypt: false,
            encrypt_type: 0,
        }
    }

    #[test]
    fn test_api_payload_reserved_params_stay_top_level() {
        let params = vec![
            param("reqUrl", "https://carrier.example/track"),
            param("reqProxy", "proxy-1"),
            param("reqTimeout", "30"),
            param("apiKey", "k-123"),
        ];
        let (payload, timeout_s) = build_api_payload(&params, LangId::En, "A1");

        assert_eq!(timeout_s, 30);
        assert_eq!(payload["trackingNo"], "A1");
        assert_eq!(payload["reqUrl"], "https://carrier.example/track");
        assert_eq!(payload["reqProxy"], "proxy-1");
        assert_eq!(payload["reqTimeout"], 30);

        // 非保留参数被折叠进reqData的JSON字符串。
        let req_data: Value =
            serde_json::from_str(payload["reqData"].as_str().unwrap()).unwrap();
        assert_eq!(req_data["apiKey"], "k-123");
    }

    #[test]
    fn test_api_payload_substitutes_language_placeholder() {
        let params = vec![param("queryUrl", "https://x.example/{lan}/track")];
        let (payload, _) = build_api_payload(&params, LangId::Cn, "A1");
        let req_data: Value =
            serde_json::from_str(payload["reqData"].as_str().unwrap()).unwrap();
        assert_eq!(req_data["queryUrl"], "https://x.example/cn/track");
    }

    #[test]
    fn test_api_payload_bad_timeout_falls_back() {
        let params = vec![param("reqTimeout", "abc")];
        let (_, timeout_s) = build_api_payload(&params, LangId::En, "A1");
        assert_eq!(timeout_s, DEFAULT_AGENT_TIMEOUT_S);
    }

    #[test]
    fn test_golang_crawler_url_appends_query() {
        assert_eq!(
            golang_crawler_url("http://c.example/t", "A1"),
            "http://c.example/t?nums=A1"
        );
        assert_eq!(
            golang_crawler_url("http://c.example/t?k=1", "A1"),
            "http://c.example/t?k=1&nums=A1"
        );
    }

    #[test]
    fn test_normalize_agent_text() {
        assert_eq!(
            normalize_agent_text("{'code': 1, 'cMess': None}"),
            "{\"code\": 1, \"cMess\": \"\"}"
        );
        assert_eq!(normalize_agent_text("{\"code\":1}"), "{\"code\":1}");
    }
}
