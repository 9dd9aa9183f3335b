//! DoH解析器构建器
//!
//! ```no_run
//! use rat_quickdoh::{DohResolverBuilder, RecordType};
//! use std::time::Duration;
//!
//! # async fn run() -> rat_quickdoh::Result<()> {
//! let resolver = DohResolverBuilder::new()
//!     .add_endpoint("https://cloudflare-dns.com/dns-query")
//!     .add_endpoint("https://dns.google/dns-query")
//!     .timeout(Duration::from_secs(3))
//!     .retries(2)
//!     .build()?;
//!
//! let response = resolver.resolve("example.com", RecordType::A).await?;
//! println!("{:?}", response.ip_addrs());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::codec::rdata::RdataDecoder;
use crate::codec::Codec;
use crate::config::ResolverConfig;
use crate::error::{DnsError, Result, TransportError};
use crate::logger::{default_logger, init_dns_logger, LevelFilter, SharedLogger};
use crate::resolver::cache::CacheConfig;
use crate::resolver::retry::Backoff;
use crate::resolver::{DohResolver, ResolverOptions};
use crate::transport::{EndpointConfig, HttpMethod, HttpsTransport, Transport};
use crate::types::{ClientSubnet, RecordType};
use crate::dns_warn;

/// 日志初始化策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerInitStrategy {
    /// 不初始化日志（让上层应用控制）
    None,
    /// 使用静默模式初始化
    Silent,
    /// 启用调试级别日志
    Debug,
    /// 按指定级别初始化
    Level(LevelFilter),
}

/// DoH解析器构建器
#[derive(Debug, Clone)]
pub struct DohResolverBuilder {
    options: ResolverOptions,
    codec: Codec,
    transport: Option<Arc<dyn Transport>>,
    logger: Option<SharedLogger>,
    logger_init_strategy: LoggerInitStrategy,
    endpoint_errors: Vec<TransportError>,
}

impl Default for DohResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DohResolverBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::from_options(ResolverOptions::default())
    }

    /// 从已有选项创建
    pub fn from_options(options: ResolverOptions) -> Self {
        Self {
            options,
            codec: Codec::new(),
            transport: None,
            logger: None,
            logger_init_strategy: LoggerInitStrategy::None,
            endpoint_errors: Vec::new(),
        }
    }

    /// 从配置文件内容创建
    pub fn from_config(config: ResolverConfig) -> Result<Self> {
        Ok(Self::from_options(config.into_options()?))
    }

    /// 添加DoH端点（自动选择GET/POST）
    ///
    /// URL无效时错误会在 [`build`](Self::build) 时返回。
    pub fn add_endpoint(self, url: impl AsRef<str>) -> Self {
        self.add_endpoint_with_method(url, HttpMethod::Auto)
    }

    /// 添加指定HTTP方法的DoH端点
    pub fn add_endpoint_with_method(mut self, url: impl AsRef<str>, method: HttpMethod) -> Self {
        match EndpointConfig::new(url.as_ref()) {
            Ok(endpoint) => self.options.endpoints.push(endpoint.with_method(method)),
            Err(e) => self.endpoint_errors.push(e),
        }
        self
    }

    /// 添加已构造的端点配置
    pub fn add_endpoint_config(mut self, endpoint: EndpointConfig) -> Self {
        self.options.endpoints.push(endpoint);
        self
    }

    /// 添加常用的公共DoH服务器
    pub fn with_public_doh(self) -> Self {
        self.add_endpoint("https://dns.alidns.com/dns-query")
            .add_endpoint("https://doh.pub/dns-query")
            .add_endpoint("https://cloudflare-dns.com/dns-query")
            .add_endpoint("https://dns.google/dns-query")
    }

    /// 设置默认单次请求超时
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// 设置每个端点的尝试次数
    pub fn retries(mut self, retries: u32) -> Self {
        self.options.retries = retries;
        self
    }

    /// 设置重试退避
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.options.backoff = backoff;
        self
    }

    /// 启用/禁用缓存
    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.options.cache_enabled = enable;
        self
    }

    /// 设置缓存参数
    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.options.cache = cache;
        self
    }

    /// 启用NXDOMAIN负缓存
    pub fn negative_ttl(mut self, floor: Duration) -> Self {
        self.options.cache.negative_ttl = Some(floor);
        self
    }

    /// 设置DNSSEC OK位
    pub fn dnssec_ok(mut self, enable: bool) -> Self {
        self.options.dnssec_ok = enable;
        self
    }

    /// 设置EDNS客户端子网
    pub fn client_subnet(mut self, subnet: ClientSubnet) -> Self {
        self.options.client_subnet = Some(subnet);
        self
    }

    /// 设置HTTP用户代理
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.options.http.user_agent = user_agent.into();
        self
    }

    /// 注入日志器
    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// 设置日志初始化策略
    pub fn with_logger_init_strategy(mut self, strategy: LoggerInitStrategy) -> Self {
        self.logger_init_strategy = strategy;
        self
    }

    /// 使用自定义传输替代默认的HTTPS传输
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// 注册自定义rdata解码器
    pub fn register_decoder(mut self, rtype: RecordType, decoder: RdataDecoder) -> Self {
        self.codec.register_decoder(rtype, decoder);
        self
    }

    /// 当前选项
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// 构建解析器
    pub fn build(self) -> Result<DohResolver> {
        self.init_logger();

        if let Some(error) = self.endpoint_errors.into_iter().next() {
            return Err(error.into());
        }
        if self.options.endpoints.is_empty() {
            return Err(DnsError::NoEndpoints);
        }

        let logger = self.logger.unwrap_or_else(default_logger);
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpsTransport::new(self.options.http.clone(), logger.clone())?),
        };

        DohResolver::from_parts(self.options, transport, self.codec, logger)
    }

    fn init_logger(&self) {
        let level = match self.logger_init_strategy {
            LoggerInitStrategy::None => return,
            LoggerInitStrategy::Silent => LevelFilter::Off,
            LoggerInitStrategy::Debug => LevelFilter::Debug,
            LoggerInitStrategy::Level(level) => level,
        };
        if let Err(e) = init_dns_logger(level) {
            if let Some(logger) = self.logger.clone() {
                dns_warn!(logger, "日志后端已被其他组件初始化: {}", e);
            }
        }
    }
}
