//! 解析器配置
//!
//! 配置可以从TOML加载，也可以直接构造。所有值在 [`ResolverConfig::validate`]
//! 中统一校验，校验通过后才能转换为 [`ResolverOptions`]。
//!
//! ```toml
//! timeout_ms = 3000
//! retries = 2
//! cache_enabled = true
//!
//! [backoff]
//! kind = "exponential"
//! base_ms = 100
//! max_ms = 1000
//!
//! [[endpoints]]
//! url = "https://cloudflare-dns.com/dns-query"
//! method = "post"
//!
//! [[endpoints]]
//! url = "https://dns.google/dns-query"
//!
//! [cache]
//! capacity = 5000
//! max_ttl_secs = 3600
//! negative_ttl_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::resolver::cache::CacheConfig;
use crate::resolver::retry::Backoff;
use crate::resolver::ResolverOptions;
use crate::transport::{EndpointConfig, HttpMethod, HttpsConfig};

/// 默认单次请求超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// 默认每个端点的尝试次数
pub const DEFAULT_RETRIES: u32 = 1;
/// 默认退避基础间隔（毫秒）
pub const DEFAULT_BACKOFF_MS: u64 = 100;
/// 默认指数退避上限（毫秒）
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 2_000;
/// 默认缓存容量
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
/// 默认TTL上限（秒）
pub const DEFAULT_MAX_TTL_SECS: u64 = 86_400;
/// 缓存TTL配置允许的最大值（秒），与DNS的32位TTL字段一致
pub const TTL_LIMIT_SECS: u64 = u32::MAX as u64;

/// 默认用户代理
pub fn default_user_agent() -> String {
    format!("rat_quickdoh/{}", env!("CARGO_PKG_VERSION"))
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 未配置端点
    #[error("No endpoints configured - at least one DoH endpoint is required")]
    NoEndpoints,
    /// 端点URL无效
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    /// 无效的超时设置
    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),
    /// 无效的重试次数
    #[error("Invalid retry count: {0}")]
    InvalidRetryCount(String),
    /// 无效的缓存容量
    #[error("Invalid cache capacity: {0}")]
    InvalidCacheCapacity(String),
    /// 无效的缓存TTL
    #[error("Invalid cache TTL: {0}")]
    InvalidCacheTtl(String),
    /// TOML解析失败
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// 读取配置文件失败
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// 单个端点的配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// DoH服务器URL
    pub url: String,
    /// HTTP方法
    #[serde(default)]
    pub method: HttpMethod,
    /// 覆盖全局超时（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// 退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// 不等待
    None,
    /// 线性
    #[default]
    Linear,
    /// 指数
    Exponential,
}

/// 退避配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSpec {
    /// 退避方式
    pub kind: BackoffKind,
    /// 基础间隔（毫秒）
    pub base_ms: u64,
    /// 上限（毫秒，仅指数退避使用）
    pub max_ms: u64,
}

impl Default for BackoffSpec {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Linear,
            base_ms: DEFAULT_BACKOFF_MS,
            max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl From<BackoffSpec> for Backoff {
    fn from(spec: BackoffSpec) -> Self {
        let base = Duration::from_millis(spec.base_ms);
        match spec.kind {
            BackoffKind::None => Backoff::None,
            BackoffKind::Linear => Backoff::Linear { base },
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(spec.max_ms),
            },
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSpec {
    /// 最大条目数
    pub capacity: usize,
    /// TTL上限（秒）
    pub max_ttl_secs: u64,
    /// NXDOMAIN负缓存TTL下限（秒），不设置则不缓存负响应
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_ttl_secs: Option<u64>,
}

impl Default for CacheSpec {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            max_ttl_secs: DEFAULT_MAX_TTL_SECS,
            negative_ttl_secs: None,
        }
    }
}

/// 解析器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// 单次请求超时（毫秒）
    pub timeout_ms: u64,
    /// 每个端点的尝试次数
    pub retries: u32,
    /// 是否启用缓存
    pub cache_enabled: bool,
    /// 是否设置DNSSEC OK位
    pub dnssec_ok: bool,
    /// HTTP用户代理
    pub user_agent: String,
    // 表类型字段放在标量之后，保证可以序列化为TOML
    /// 同一端点重试间的退避
    pub backoff: BackoffSpec,
    /// 缓存参数
    pub cache: CacheSpec,
    /// 端点列表，顺序即回退优先级
    pub endpoints: Vec<EndpointSpec>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            cache_enabled: true,
            dnssec_ok: false,
            user_agent: default_user_agent(),
            backoff: BackoffSpec::default(),
            cache: CacheSpec::default(),
            endpoints: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// 从TOML字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ResolverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从TOML文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 序列化为TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("timeout_ms must be greater than 0".to_string()));
        }

        for spec in &self.endpoints {
            EndpointConfig::new(&spec.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
            if spec.timeout_ms == Some(0) {
                return Err(ConfigError::InvalidTimeout(format!(
                    "endpoint {} has a zero timeout",
                    spec.url
                )));
            }
        }

        if self.retries == 0 {
            return Err(ConfigError::InvalidRetryCount(
                "retries must be at least 1".to_string(),
            ));
        }

        if self.backoff.kind == BackoffKind::Exponential && self.backoff.max_ms < self.backoff.base_ms {
            return Err(ConfigError::InvalidTimeout(format!(
                "backoff max_ms ({}) is smaller than base_ms ({})",
                self.backoff.max_ms, self.backoff.base_ms
            )));
        }

        if self.cache_enabled && self.cache.capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity(
                "capacity must be greater than 0 when the cache is enabled".to_string(),
            ));
        }

        if self.cache.max_ttl_secs > TTL_LIMIT_SECS {
            return Err(ConfigError::InvalidCacheTtl(format!(
                "max_ttl_secs {} exceeds {}",
                self.cache.max_ttl_secs, TTL_LIMIT_SECS
            )));
        }

        if let Some(negative) = self.cache.negative_ttl_secs.filter(|&secs| secs > TTL_LIMIT_SECS) {
            return Err(ConfigError::InvalidCacheTtl(format!(
                "negative_ttl_secs {} exceeds {}",
                negative, TTL_LIMIT_SECS
            )));
        }

        Ok(())
    }

    /// 校验并转换为解析器选项
    pub fn into_options(self) -> Result<ResolverOptions, ConfigError> {
        self.validate()?;

        let timeout = Duration::from_millis(self.timeout_ms);
        let endpoints = self
            .endpoints
            .iter()
            .map(|spec| {
                let endpoint = EndpointConfig::new(&spec.url)
                    .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?
                    .with_method(spec.method);
                Ok(match spec.timeout_ms {
                    Some(ms) => endpoint.with_timeout(Duration::from_millis(ms)),
                    None => endpoint,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(ResolverOptions {
            endpoints,
            timeout,
            retries: self.retries,
            backoff: self.backoff.into(),
            cache_enabled: self.cache_enabled,
            cache: CacheConfig {
                capacity: self.cache.capacity,
                max_ttl: Duration::from_secs(self.cache.max_ttl_secs),
                negative_ttl: self.cache.negative_ttl_secs.map(Duration::from_secs),
            },
            dnssec_ok: self.dnssec_ok,
            client_subnet: None,
            http: HttpsConfig {
                user_agent: self.user_agent,
                ..HttpsConfig::default()
            },
        })
    }
}
