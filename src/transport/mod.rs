//! DoH传输层抽象 (RFC 8484)

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::error::TransportError;
use crate::types::WireMessage;

pub mod https;

pub use https::HttpsTransport;

/// DoH报文的媒体类型
pub const CONTENT_TYPE_DNS_MESSAGE: &str = "application/dns-message";

/// 默认单次请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `HttpMethod::Auto` 下使用GET的最大编码长度
pub const AUTO_GET_THRESHOLD: usize = 2048;

/// GET请求 `dns` 参数的最大长度
pub const MAX_GET_PARAM_LEN: usize = 8192;

/// DoH传输层抽象接口
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// 将报文发送到端点并返回原始应答字节
    ///
    /// 超时由端点配置决定；超时或被取消时必须释放底层连接。
    async fn send(&self, message: &WireMessage, endpoint: &EndpointConfig) -> Result<Bytes, TransportError>;

    /// 获取传输类型名称
    fn transport_type(&self) -> &'static str;
}

/// HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET方法，报文以base64url放入 `dns` 参数
    GET,
    /// POST方法，报文作为请求体
    POST,
    /// 按报文大小自动选择
    Auto,
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Auto
    }
}

impl HttpMethod {
    /// 根据base64url编码后的长度确定实际使用的方法
    pub fn select(self, encoded_len: usize) -> HttpMethod {
        match self {
            HttpMethod::Auto if encoded_len <= AUTO_GET_THRESHOLD => HttpMethod::GET,
            HttpMethod::Auto => HttpMethod::POST,
            method => method,
        }
    }
}

/// base64url（无填充）编码后的长度
pub fn base64url_len(len: usize) -> usize {
    (len * 4 + 2) / 3
}

/// DoH端点配置
///
/// 构造后只读；端点列表的顺序即回退优先级。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// DoH服务器URL
    pub url: Url,
    /// 首选HTTP方法
    pub method: HttpMethod,
    /// 单次请求超时，未设置时使用解析器的默认值
    pub timeout: Option<Duration>,
}

impl EndpointConfig {
    /// 从URL创建端点（自动选择方法）
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", url, e)))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(TransportError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                url
            )));
        }
        Ok(Self {
            url,
            method: HttpMethod::Auto,
            timeout: None,
        })
    }

    /// 设置HTTP方法
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// 设置单次请求超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 实际生效的超时
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// HTTPS客户端配置
#[derive(Debug, Clone)]
pub struct HttpsConfig {
    /// 用户代理
    pub user_agent: String,
    /// 连接建立超时
    pub connect_timeout: Duration,
    /// 空闲连接保留时间
    pub pool_idle_timeout: Duration,
    /// 是否启用TCP无延迟
    pub tcp_nodelay: bool,
}

impl Default for HttpsConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::config::default_user_agent(),
            connect_timeout: Duration::from_secs(3),
            pool_idle_timeout: Duration::from_secs(30),
            tcp_nodelay: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_method_selection() {
        assert_eq!(HttpMethod::Auto.select(100), HttpMethod::GET);
        assert_eq!(HttpMethod::Auto.select(AUTO_GET_THRESHOLD), HttpMethod::GET);
        assert_eq!(HttpMethod::Auto.select(AUTO_GET_THRESHOLD + 1), HttpMethod::POST);
        assert_eq!(HttpMethod::GET.select(10_000), HttpMethod::GET);
        assert_eq!(HttpMethod::POST.select(1), HttpMethod::POST);
    }

    #[test]
    fn test_base64url_len() {
        assert_eq!(base64url_len(0), 0);
        assert_eq!(base64url_len(1), 2);
        assert_eq!(base64url_len(2), 3);
        assert_eq!(base64url_len(3), 4);
        assert_eq!(base64url_len(29), 39);
    }

    #[test]
    fn test_endpoint_rejects_bad_urls() {
        assert!(EndpointConfig::new("not a url").is_err());
        assert!(matches!(
            EndpointConfig::new("ftp://dns.example/dns-query"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        let endpoint = EndpointConfig::new("https://dns.example/dns-query").unwrap();
        assert_eq!(endpoint.method, HttpMethod::Auto);
        assert_eq!(endpoint.effective_timeout(), DEFAULT_TIMEOUT);
    }
}
