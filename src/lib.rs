//! RatQuickDoH - DNS over HTTPS (RFC 8484) 客户端核心
//!
//! 提供DNS报文编解码、基于HTTPS的GET/POST传输、TTL缓存，以及多端点的重试与回退。

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod types;
pub mod codec;
pub mod transport;
pub mod resolver;
pub mod error;
pub mod config;
pub mod builder;
pub mod dns_response;
pub mod logger;

pub use types::*;
pub use codec::Codec;
pub use transport::{EndpointConfig, HttpMethod, HttpsConfig, HttpsTransport, Transport};
pub use resolver::cache::{CacheConfig, CacheStats, DnsCache};
pub use resolver::retry::{Backoff, RetryPolicy};
pub use resolver::{resolve, DohResolver, Resolved, ResolverOptions, Source};
pub use error::{
    AttemptError, AttemptFailure, DecodeError, DnsError, EncodeError, ResolutionError, Result,
    TransportError,
};
pub use config::{ConfigError, ResolverConfig};
pub use builder::{DohResolverBuilder, LoggerInitStrategy};
pub use dns_response::DnsResponseBuilder;
pub use logger::{init_dns_logger, init_dns_logger_silent, dns_format, DnsLogger, LogFacade, SilentLogger};

/// 便捷宏：快速创建DoH解析器
#[macro_export]
macro_rules! quick_doh {
    () => {
        $crate::DohResolverBuilder::new().with_public_doh().build()
    };
    (timeout = $timeout:expr) => {
        $crate::DohResolverBuilder::new()
            .with_public_doh()
            .timeout(std::time::Duration::from_secs($timeout))
            .build()
    };
    (endpoints = [$($url:expr),* $(,)?]) => {
        {
            let builder = $crate::DohResolverBuilder::new();
            $(
                let builder = builder.add_endpoint($url);
            )*
            builder.build()
        }
    };
}
