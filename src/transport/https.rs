//! HTTPS传输实现 (DNS over HTTPS)

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::{Bytes, BytesMut};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use tokio::time::timeout;

use super::{
    base64url_len, EndpointConfig, HttpMethod, HttpsConfig, Transport, CONTENT_TYPE_DNS_MESSAGE,
    MAX_GET_PARAM_LEN,
};
use crate::codec::MAX_MESSAGE_SIZE;
use crate::error::TransportError;
use crate::logger::SharedLogger;
use crate::types::WireMessage;
use crate::{dns_debug, dns_timeout, dns_upstream};

/// HTTPS传输实现
///
/// 内部的 `reqwest::Client` 在所有端点间共享连接池。
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: Client,
    logger: SharedLogger,
}

impl HttpsTransport {
    /// 创建新的HTTPS传输
    pub fn new(config: HttpsConfig, logger: SharedLogger) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .tcp_nodelay(config.tcp_nodelay)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, logger })
    }

    /// 按RFC 8484构造请求
    fn build_request(&self, message: &WireMessage, endpoint: &EndpointConfig) -> Result<RequestBuilder, TransportError> {
        let encoded_len = base64url_len(message.len());
        match endpoint.method.select(encoded_len) {
            HttpMethod::POST => Ok(self
                .client
                .post(endpoint.url.clone())
                .header(CONTENT_TYPE, CONTENT_TYPE_DNS_MESSAGE)
                .header(ACCEPT, CONTENT_TYPE_DNS_MESSAGE)
                .body(message.bytes())),
            _ => {
                if encoded_len > MAX_GET_PARAM_LEN {
                    return Err(TransportError::PayloadTooLarge {
                        size: encoded_len,
                        limit: MAX_GET_PARAM_LEN,
                    });
                }
                let dns_query = general_purpose::URL_SAFE_NO_PAD.encode(message.as_bytes());
                let mut url = endpoint.url.clone();
                url.query_pairs_mut().append_pair("dns", &dns_query);
                Ok(self.client.get(url).header(ACCEPT, CONTENT_TYPE_DNS_MESSAGE))
            }
        }
    }

    /// 发送请求并校验状态码、Content-Type和大小
    async fn execute(&self, request: RequestBuilder) -> Result<Bytes, TransportError> {
        let mut http_response = request
            .send()
            .await
            .map_err(|e| TransportError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = http_response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let content_type = http_response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !is_dns_message(content_type) {
            return Err(TransportError::ContentTypeMismatch {
                found: content_type.to_string(),
            });
        }

        if let Some(len) = http_response.content_length() {
            if len as usize > MAX_MESSAGE_SIZE {
                return Err(TransportError::PayloadTooLarge {
                    size: len as usize,
                    limit: MAX_MESSAGE_SIZE,
                });
            }
        }

        // 没有Content-Length（如分块编码）时边读边检查
        let mut body = BytesMut::new();
        while let Some(chunk) = http_response
            .chunk()
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to read response body: {}", e)))?
        {
            if body.len() + chunk.len() > MAX_MESSAGE_SIZE {
                return Err(TransportError::PayloadTooLarge {
                    size: body.len() + chunk.len(),
                    limit: MAX_MESSAGE_SIZE,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

/// 媒体类型（忽略参数，大小写不敏感）必须是 application/dns-message
fn is_dns_message(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(CONTENT_TYPE_DNS_MESSAGE))
        .unwrap_or(false)
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn send(&self, message: &WireMessage, endpoint: &EndpointConfig) -> Result<Bytes, TransportError> {
        if message.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: message.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }

        let deadline = endpoint.effective_timeout();
        let request = self.build_request(message, endpoint)?;
        dns_upstream!(self.logger, endpoint, format_args!("id={} {}B", message.id(), message.len()));

        // 超时后丢弃请求future，连接随之释放
        match timeout(deadline, self.execute(request)).await {
            Ok(Ok(body)) => {
                dns_debug!(self.logger, "🌐 DoH 应答 {} 字节 <- {}", body.len(), endpoint);
                Ok(body)
            }
            Ok(Err(e)) => {
                dns_debug!(self.logger, "❌ DoH 请求失败 {}: {}", endpoint, e);
                Err(e)
            }
            Err(_) => {
                dns_timeout!(self.logger, endpoint, deadline);
                Err(TransportError::Timeout(deadline))
            }
        }
    }

    fn transport_type(&self) -> &'static str {
        "HTTPS"
    }
}
