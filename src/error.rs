//! 错误类型定义

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::types::RecordType;

/// DNS查询结果类型
pub type Result<T> = std::result::Result<T, DnsError>;

/// 查询编码错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// 域名中出现空标签（如 `a..b`）
    #[error("Empty label in domain name")]
    EmptyLabel,
    /// 标签超过63字节
    #[error("Label '{label}' is {len} octets long (max 63)")]
    LabelTooLong {
        /// 出错的标签
        label: String,
        /// 标签长度
        len: usize,
    },
    /// 域名编码后超过255字节
    #[error("Domain name is {0} octets long (max 255)")]
    NameTooLong(usize),
    /// 报文超过65535字节
    #[error("Message is {0} octets long (max 65535)")]
    MessageTooLarge(usize),
    /// 记录数据无法编码
    #[error("Cannot encode {rtype} record: {reason}")]
    InvalidRdata {
        /// 记录类型
        rtype: RecordType,
        /// 原因
        reason: String,
    },
}

/// 报文所在的部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// 问题部分
    Question,
    /// 回答部分
    Answer,
    /// 权威部分
    Authority,
    /// 附加部分
    Additional,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Question => write!(f, "question"),
            Section::Answer => write!(f, "answer"),
            Section::Authority => write!(f, "authority"),
            Section::Additional => write!(f, "additional"),
        }
    }
}

/// 响应解码错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// 数据在读取过程中提前结束
    #[error("Message truncated at offset {offset} (needed {needed} more octets)")]
    Truncated {
        /// 读取位置
        offset: usize,
        /// 缺少的字节数
        needed: usize,
    },
    /// 压缩指针指向当前位置或之后
    #[error("Invalid compression pointer at offset {at} -> {target}")]
    BadPointer {
        /// 指针所在位置
        at: usize,
        /// 指针目标
        target: usize,
    },
    /// 单个域名中的压缩跳转过多
    #[error("Too many compression pointers in one name")]
    TooManyPointers,
    /// 头部计数与剩余数据不符
    #[error("{section} count {count} inconsistent with {remaining} remaining octets")]
    CountMismatch {
        /// 所在部分
        section: Section,
        /// 声明的条目数
        count: u16,
        /// 剩余字节数
        remaining: usize,
    },
    /// 解压后的域名超过255字节
    #[error("Decoded domain name exceeds 255 octets")]
    NameTooLong,
    /// 标签长度字节使用了保留的高位组合
    #[error("Invalid label type 0x{0:02X}")]
    InvalidLabel(u8),
    /// 记录数据格式错误
    #[error("Invalid {rtype} rdata: {reason}")]
    InvalidRdata {
        /// 记录类型
        rtype: RecordType,
        /// 原因
        reason: String,
    },
    /// QR位未置位
    #[error("Message is not a response")]
    NotAResponse,
    /// 事务ID与查询不一致
    #[error("Transaction id mismatch: expected {expected}, got {actual}")]
    IdMismatch {
        /// 查询的ID
        expected: u16,
        /// 响应的ID
        actual: u16,
    },
    /// 回显的问题与查询不一致
    #[error("Question section does not echo the query")]
    QuestionMismatch,
}

/// DoH传输错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 非2xx状态码
    #[error("HTTP error: {status} {reason}")]
    HttpStatus {
        /// 状态码
        status: u16,
        /// 状态描述
        reason: String,
    },
    /// Content-Type 不是 application/dns-message
    #[error("Invalid content type: expected 'application/dns-message', got '{found}'")]
    ContentTypeMismatch {
        /// 实际收到的类型
        found: String,
    },
    /// 单次尝试超时
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),
    /// 连接或请求失败
    #[error("Connection error: {0}")]
    Connection(String),
    /// 报文超出传输允许的大小
    #[error("Payload of {size} octets exceeds transport limit {limit}")]
    PayloadTooLarge {
        /// 实际大小
        size: usize,
        /// 上限
        limit: usize,
    },
    /// 端点URL不可用
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// 简短的错误类别名
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::HttpStatus { .. } => "HttpStatusError",
            TransportError::ContentTypeMismatch { .. } => "ContentTypeMismatch",
            TransportError::Timeout(_) => "Timeout",
            TransportError::Connection(_) => "ConnectionError",
            TransportError::PayloadTooLarge { .. } => "PayloadTooLarge",
            TransportError::InvalidEndpoint(_) => "InvalidEndpoint",
        }
    }
}

/// 单次尝试失败的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// 传输失败
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// 响应无法解码或校验失败
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// 某个端点上的一次失败尝试
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// 端点URL
    pub endpoint: String,
    /// 该端点上的第几次尝试（从1开始）
    pub attempt: u32,
    /// 失败原因
    pub error: AttemptError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (attempt {}): {}", self.endpoint, self.attempt, self.error)
    }
}

/// 所有端点均失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    /// 查询的域名
    pub name: String,
    /// 查询类型
    pub record_type: RecordType,
    /// 按端点顺序排列的失败记录
    pub attempts: Vec<AttemptFailure>,
}

impl ResolutionError {
    /// 统计满足条件的失败次数
    pub fn count_where(&self, pred: impl Fn(&AttemptError) -> bool) -> usize {
        self.attempts.iter().filter(|failure| pred(&failure.error)).count()
    }

    /// 某个端点上的全部失败
    pub fn failures_for<'a>(&'a self, endpoint: &'a str) -> impl Iterator<Item = &'a AttemptFailure> + 'a {
        self.attempts.iter().filter(move |failure| failure.endpoint == endpoint)
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to resolve {} {} after {} attempt(s)",
            self.name,
            self.record_type,
            self.attempts.len()
        )?;
        for failure in &self.attempts {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResolutionError {}

/// DNS错误类型
#[derive(Debug, Error)]
pub enum DnsError {
    /// 查询无法编码
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
    /// 响应无法解码
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),
    /// 传输失败
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    /// 所有端点均失败
    #[error("{0}")]
    Resolution(#[from] ResolutionError),
    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// 查询被调用方取消
    #[error("Query cancelled")]
    Cancelled,
    /// 未配置任何端点
    #[error("No endpoints configured")]
    NoEndpoints,
}

impl DnsError {
    /// 若为解析失败则返回聚合错误
    pub fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            DnsError::Resolution(err) => Some(err),
            _ => None,
        }
    }
}
