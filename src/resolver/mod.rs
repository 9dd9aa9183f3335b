//! DoH解析器：缓存、重试与端点回退
//!
//! 一次解析的状态流转：
//!
//! ```text
//! Pending(端点i, 第n次) --成功--> Done
//!        |--失败且n < 尝试次数--> 退避后 Pending(端点i, 第n+1次)
//!        |--失败且n = 尝试次数--> NextEndpoint --> Pending(端点i+1, 第1次)
//!        `--端点耗尽--> Failed(ResolutionError)
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::error::{AttemptError, AttemptFailure, DnsError, ResolutionError, Result};
use crate::logger::{default_logger, SharedLogger};
use crate::transport::{EndpointConfig, HttpsConfig, HttpsTransport, Transport, DEFAULT_TIMEOUT};
use crate::types::{ClientSubnet, Edns, QClass, Query, RecordType, Response};
use crate::{dns_debug, dns_error, dns_info, dns_warn};

pub mod cache;
pub mod retry;

use cache::{CacheConfig, DnsCache};
use retry::{Backoff, RetryPolicy};

/// 解析选项
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// 端点列表，顺序即回退优先级
    pub endpoints: Vec<EndpointConfig>,
    /// 端点未单独设置时的单次请求超时
    pub timeout: Duration,
    /// 每个端点的尝试次数（1表示不重试）
    pub retries: u32,
    /// 同一端点重试间的退避
    pub backoff: Backoff,
    /// 是否启用缓存
    pub cache_enabled: bool,
    /// 缓存参数
    pub cache: CacheConfig,
    /// 是否设置DNSSEC OK位
    pub dnssec_ok: bool,
    /// EDNS客户端子网
    pub client_subnet: Option<ClientSubnet>,
    /// HTTPS客户端参数
    pub http: HttpsConfig,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: crate::config::DEFAULT_RETRIES,
            backoff: Backoff::default(),
            cache_enabled: true,
            cache: CacheConfig::default(),
            dnssec_ok: false,
            client_subnet: None,
            http: HttpsConfig::default(),
        }
    }
}

impl ResolverOptions {
    /// 以给定端点创建默认选项
    pub fn with_endpoints(endpoints: Vec<EndpointConfig>) -> Self {
        Self {
            endpoints,
            ..Self::default()
        }
    }

    fn edns(&self) -> Option<Edns> {
        if !self.dnssec_ok && self.client_subnet.is_none() {
            return None;
        }
        let edns = Edns::new(self.dnssec_ok);
        Some(match self.client_subnet.clone() {
            Some(subnet) => edns.with_client_subnet(subnet),
            None => edns,
        })
    }
}

/// 应答来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// 缓存命中
    Cache,
    /// 由该端点应答
    Endpoint(String),
}

/// 带过程信息的解析结果
#[derive(Debug, Clone)]
pub struct Resolved {
    /// 解码后的应答
    pub response: Response,
    /// 应答来源
    pub source: Source,
    /// 成功之前失败的尝试，按端点顺序
    pub failures: Vec<AttemptFailure>,
}

/// DoH解析器
///
/// 可被多个任务共享并发调用；唯一的共享可变状态是内部加锁的缓存。
#[derive(Debug, Clone)]
pub struct DohResolver {
    transport: Arc<dyn Transport>,
    codec: Arc<Codec>,
    cache: Option<Arc<DnsCache>>,
    endpoints: Arc<[EndpointConfig]>,
    retry: RetryPolicy,
    edns: Option<Edns>,
    logger: SharedLogger,
}

impl DohResolver {
    /// 使用默认HTTPS传输和日志器创建解析器
    pub fn new(options: ResolverOptions) -> Result<Self> {
        let logger = default_logger();
        let transport = HttpsTransport::new(options.http.clone(), logger.clone())?;
        Self::from_parts(options, Arc::new(transport), Codec::new(), logger)
    }

    /// 由各组件组装解析器
    pub fn from_parts(
        options: ResolverOptions,
        transport: Arc<dyn Transport>,
        codec: Codec,
        logger: SharedLogger,
    ) -> Result<Self> {
        if options.endpoints.is_empty() {
            return Err(DnsError::NoEndpoints);
        }

        let edns = options.edns();
        let endpoints: Arc<[EndpointConfig]> = options
            .endpoints
            .into_iter()
            .map(|endpoint| match endpoint.timeout {
                Some(_) => endpoint,
                None => endpoint.with_timeout(options.timeout),
            })
            .collect();

        let cache = options
            .cache_enabled
            .then(|| Arc::new(DnsCache::new(options.cache, logger.clone())));

        dns_info!(
            logger,
            "🌐 DoH解析器就绪: {} 个端点, 传输 {}, 缓存 {}",
            endpoints.len(),
            transport.transport_type(),
            if cache.is_some() { "启用" } else { "禁用" }
        );

        Ok(Self {
            transport,
            codec: Arc::new(codec),
            cache,
            endpoints,
            retry: RetryPolicy::new(options.retries, options.backoff),
            edns,
            logger,
        })
    }

    /// 解析域名（INET类别）
    pub async fn resolve(&self, name: &str, record_type: RecordType) -> Result<Response> {
        self.resolve_with_class(name, record_type, QClass::IN).await
    }

    /// 指定类别解析域名
    pub async fn resolve_with_class(&self, name: &str, record_type: RecordType, class: QClass) -> Result<Response> {
        let mut query = Query::with_class(name, record_type, class);
        if let Some(edns) = &self.edns {
            query = query.with_edns(edns.clone());
        }
        self.resolve_query(&query).await
    }

    /// 可取消的解析
    ///
    /// 取消后正在进行的传输调用被丢弃并释放连接，缓存不会写入任何结果。
    pub async fn resolve_with_cancel(
        &self,
        name: &str,
        record_type: RecordType,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                dns_debug!(self.logger, "🛑 查询已取消: {} {}", name, record_type);
                Err(DnsError::Cancelled)
            }
            result = self.resolve(name, record_type) => result,
        }
    }

    /// 解析已构造好的查询
    pub async fn resolve_query(&self, query: &Query) -> Result<Response> {
        self.resolve_query_detailed(query).await.map(|resolved| resolved.response)
    }

    /// 解析并返回应答来源和成功前的失败记录
    pub async fn resolve_detailed(&self, name: &str, record_type: RecordType) -> Result<Resolved> {
        let mut query = Query::new(name, record_type);
        if let Some(edns) = &self.edns {
            query = query.with_edns(edns.clone());
        }
        self.resolve_query_detailed(&query).await
    }

    async fn resolve_query_detailed(&self, query: &Query) -> Result<Resolved> {
        if let Some(cache) = &self.cache {
            if let Some(response) = cache.get(query) {
                return Ok(Resolved {
                    response,
                    source: Source::Cache,
                    failures: Vec::new(),
                });
            }
        }

        let resolved = self.query_endpoints(query).await?;

        if let Some(cache) = &self.cache {
            cache.insert(query.name(), query.qtype(), query.qclass(), resolved.response.clone());
        }
        Ok(resolved)
    }

    /// 依次尝试各端点，直到成功或全部失败
    async fn query_endpoints(&self, query: &Query) -> Result<Resolved> {
        dns_info!(self.logger, "🔍 开始DoH查询: {} {}", query.name(), query.qtype());
        let mut failures = Vec::new();

        for endpoint in self.endpoints.iter() {
            for attempt in 1..=self.retry.attempts {
                let delay = self.retry.delay_before(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                match self.attempt(query, endpoint).await? {
                    Ok(response) => {
                        dns_info!(
                            self.logger,
                            "✅ {} {} 解析成功 via {} ({} 条回答)",
                            query.name(),
                            query.qtype(),
                            endpoint,
                            response.answers.len()
                        );
                        return Ok(Resolved {
                            response,
                            source: Source::Endpoint(endpoint.to_string()),
                            failures,
                        });
                    }
                    Err(error) => {
                        dns_warn!(
                            self.logger,
                            "❌ {} 第{}次尝试失败: {} ({})",
                            endpoint,
                            attempt,
                            error,
                            attempt_kind(&error)
                        );
                        failures.push(AttemptFailure {
                            endpoint: endpoint.to_string(),
                            attempt,
                            error,
                        });
                    }
                }
            }
            dns_debug!(self.logger, "↪️ 端点 {} 已耗尽，切换下一个", endpoint);
        }

        dns_error!(
            self.logger,
            "🚫 {} {} 在 {} 次尝试后解析失败",
            query.name(),
            query.qtype(),
            failures.len()
        );
        Err(ResolutionError {
            name: query.name().to_string(),
            record_type: query.qtype(),
            attempts: failures,
        }
        .into())
    }

    /// 单次尝试
    ///
    /// 外层错误（编码失败）直接终止解析；内层错误计入失败历史并触发重试或回退。
    async fn attempt(
        &self,
        query: &Query,
        endpoint: &EndpointConfig,
    ) -> Result<std::result::Result<Response, AttemptError>> {
        let query = query.regenerate_id();
        let message = self.codec.encode(&query)?;

        let bytes = match self.transport.send(&message, endpoint).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(e.into())),
        };

        Ok(self.codec.decode_reply(&query, &bytes).map_err(AttemptError::from))
    }

    /// 缓存句柄（未启用时为 `None`）
    pub fn cache(&self) -> Option<&DnsCache> {
        self.cache.as_deref()
    }

    /// 已配置的端点
    pub fn endpoints(&self) -> &[EndpointConfig] {
        &self.endpoints
    }

    /// 重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

fn attempt_kind(error: &AttemptError) -> &'static str {
    match error {
        AttemptError::Transport(e) => e.kind(),
        AttemptError::Decode(_) => "DecodeError",
    }
}

/// 一次性解析：以给定选项创建解析器并解析
pub async fn resolve(name: &str, record_type: RecordType, options: ResolverOptions) -> Result<Response> {
    DohResolver::new(options)?.resolve(name, record_type).await
}
