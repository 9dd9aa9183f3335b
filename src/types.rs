//! DNS核心类型定义

use bytes::Bytes;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// DNS查询问题
///
/// 构造后不可变。域名在构造时规范化：去除首尾空白、转小写、去掉末尾的点。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    name: String,
    qtype: RecordType,
    qclass: QClass,
    id: u16,
    edns: Option<Edns>,
}

impl Query {
    /// 创建新的查询（INET类别，随机事务ID）
    pub fn new(name: &str, qtype: RecordType) -> Self {
        Self::with_class(name, qtype, QClass::IN)
    }

    /// 指定查询类别创建查询
    pub fn with_class(name: &str, qtype: RecordType, qclass: QClass) -> Self {
        Self {
            name: normalize_name(name),
            qtype,
            qclass,
            id: rand::random(),
            edns: None,
        }
    }

    /// 附带EDNS(0)选项
    pub fn with_edns(mut self, edns: Edns) -> Self {
        self.edns = Some(edns);
        self
    }

    /// 生成相同问题但事务ID全新的查询
    ///
    /// 每次发送尝试都应使用新的事务ID。
    pub fn regenerate_id(&self) -> Self {
        Self {
            id: rand::random(),
            ..self.clone()
        }
    }

    /// 规范化后的域名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 查询类型
    pub fn qtype(&self) -> RecordType {
        self.qtype
    }

    /// 查询类别
    pub fn qclass(&self) -> QClass {
        self.qclass
    }

    /// 事务ID
    pub fn id(&self) -> u16 {
        self.id
    }

    /// EDNS选项
    pub fn edns(&self) -> Option<&Edns> {
        self.edns.as_ref()
    }

    /// 问题部分
    pub fn question(&self) -> Question {
        Question {
            name: self.name.clone(),
            qtype: self.qtype,
            qclass: self.qclass,
        }
    }
}

/// 规范化域名：大小写不敏感，去掉末尾的点
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// 报文中的问题条目
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    /// 查询名称
    pub name: String,
    /// 查询类型
    pub qtype: RecordType,
    /// 查询类别
    pub qclass: QClass,
}

impl Question {
    /// 与查询是否为同一问题（名称大小写不敏感）
    pub fn matches(&self, query: &Query) -> bool {
        normalize_name(&self.name) == query.name()
            && self.qtype == query.qtype()
            && self.qclass == query.qclass()
    }
}

/// 编码后的DNS报文
///
/// 由编解码器产生，之后不再修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    id: u16,
    bytes: Bytes,
}

impl WireMessage {
    pub(crate) fn new(id: u16, bytes: Vec<u8>) -> Self {
        Self {
            id,
            bytes: Bytes::from(bytes),
        }
    }

    /// 报文头中的事务ID
    pub fn id(&self) -> u16 {
        self.id
    }

    /// 原始字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 共享的字节缓冲区
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// 报文长度
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// DNS响应
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// 事务ID
    pub id: u16,
    /// 标志位
    pub flags: Flags,
    /// 回显的问题
    pub queries: Vec<Question>,
    /// 回答记录
    pub answers: Vec<ResourceRecord>,
    /// 权威记录
    pub authorities: Vec<ResourceRecord>,
    /// 附加记录
    pub additionals: Vec<ResourceRecord>,
}

impl Response {
    /// 响应码
    pub fn rcode(&self) -> ResponseCode {
        ResponseCode::from(self.flags.rcode)
    }

    /// 是否被截断
    pub fn is_truncated(&self) -> bool {
        self.flags.tc
    }

    /// 回答部分中所有A/AAAA地址
    pub fn ip_addrs(&self) -> Vec<IpAddr> {
        self.answers
            .iter()
            .filter_map(|record| match &record.data {
                RecordData::A(ip) => Some(IpAddr::V4(*ip)),
                RecordData::AAAA(ip) => Some(IpAddr::V6(*ip)),
                _ => None,
            })
            .collect()
    }

    /// 回答部分的最小TTL，无回答时为None
    pub fn min_answer_ttl(&self) -> Option<u32> {
        self.answers.iter().map(|record| record.ttl).min()
    }
}

/// DNS资源记录
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// 记录名称
    pub name: String,
    /// 记录类型
    pub rtype: RecordType,
    /// 记录类别
    pub class: QClass,
    /// 生存时间(秒)
    pub ttl: u32,
    /// 记录数据
    pub data: RecordData,
}

/// DNS记录数据
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    /// A记录 - IPv4地址
    A(Ipv4Addr),
    /// AAAA记录 - IPv6地址
    AAAA(Ipv6Addr),
    /// CNAME记录 - 别名
    CNAME(String),
    /// MX记录 - 邮件交换
    MX {
        /// 优先级，数值越小优先级越高
        priority: u16,
        /// 邮件服务器域名
        exchange: String,
    },
    /// NS记录 - 名称服务器
    NS(String),
    /// PTR记录 - 指针
    PTR(String),
    /// SOA记录 - 授权开始
    SOA {
        /// 主名称服务器
        mname: String,
        /// 管理员邮箱
        rname: String,
        /// 序列号
        serial: u32,
        /// 刷新间隔（秒）
        refresh: u32,
        /// 重试间隔（秒）
        retry: u32,
        /// 过期时间（秒）
        expire: u32,
        /// 最小TTL（秒）
        minimum: u32,
    },
    /// TXT记录 - 文本
    TXT(Vec<String>),
    /// SRV记录 - 服务
    SRV {
        /// 优先级
        priority: u16,
        /// 权重
        weight: u16,
        /// 服务端口号
        port: u16,
        /// 目标主机名
        target: String,
    },
    /// OPT伪记录 (EDNS0)
    Opt(EdnsRecord),
    /// 没有注册解码器的记录类型，保留原始rdata
    Unknown(Vec<u8>),
}

/// DNS记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// A记录
    A,
    /// NS记录
    NS,
    /// CNAME记录
    CNAME,
    /// SOA记录
    SOA,
    /// PTR记录
    PTR,
    /// MX记录
    MX,
    /// TXT记录
    TXT,
    /// AAAA记录
    AAAA,
    /// SRV记录
    SRV,
    /// OPT伪记录
    OPT,
    /// 未知类型
    Unknown(u16),
}

/// DNS查询类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QClass {
    /// Internet类别
    IN,
    /// Chaos类别
    CH,
    /// Hesiod类别
    HS,
    /// 任意类别
    ANY,
    /// 未知类别（OPT记录在此携带UDP载荷大小）
    Unknown(u16),
}

/// DNS标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    /// 查询/响应标志
    pub qr: bool,
    /// 操作码
    pub opcode: u8,
    /// 权威回答
    pub aa: bool,
    /// 截断标志
    pub tc: bool,
    /// 期望递归
    pub rd: bool,
    /// 递归可用
    pub ra: bool,
    /// 保留位（含AD/CD）
    pub z: u8,
    /// 响应码
    pub rcode: u8,
}

impl Flags {
    /// 从报文头的16位标志字段解析
    pub fn from_u16(raw: u16) -> Self {
        Self {
            qr: (raw & 0x8000) != 0,
            opcode: ((raw >> 11) & 0x0F) as u8,
            aa: (raw & 0x0400) != 0,
            tc: (raw & 0x0200) != 0,
            rd: (raw & 0x0100) != 0,
            ra: (raw & 0x0080) != 0,
            z: ((raw >> 4) & 0x07) as u8,
            rcode: (raw & 0x0F) as u8,
        }
    }

    /// 编码为报文头的16位标志字段
    pub fn to_u16(self) -> u16 {
        let mut flags = 0u16;
        if self.qr {
            flags |= 0x8000;
        }
        flags |= ((self.opcode & 0x0F) as u16) << 11;
        if self.aa {
            flags |= 0x0400;
        }
        if self.tc {
            flags |= 0x0200;
        }
        if self.rd {
            flags |= 0x0100;
        }
        if self.ra {
            flags |= 0x0080;
        }
        flags |= ((self.z & 0x07) as u16) << 4;
        flags |= (self.rcode & 0x0F) as u16;
        flags
    }
}

// 查询默认只设置RD位
impl Default for Flags {
    fn default() -> Self {
        Self {
            qr: false,
            opcode: 0,
            aa: false,
            tc: false,
            rd: true,
            ra: false,
            z: 0,
            rcode: 0,
        }
    }
}

/// DNS响应码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// 无错误
    NoError,
    /// 格式错误
    FormatError,
    /// 服务器失败
    ServerFailure,
    /// 域名不存在
    NxDomain,
    /// 未实现
    NotImplemented,
    /// 查询被拒绝
    Refused,
    /// 未知响应码
    Unknown(u8),
}

/// 查询附带的EDNS(0)设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns {
    /// 通告的UDP载荷大小
    pub udp_payload_size: u16,
    /// DO位(DNSSEC OK)
    pub dnssec_ok: bool,
    /// 客户端子网 (RFC 7871)
    pub client_subnet: Option<ClientSubnet>,
}

impl Edns {
    /// 默认通告载荷
    pub const DEFAULT_PAYLOAD_SIZE: u16 = 4096;

    /// 创建EDNS设置
    pub fn new(dnssec_ok: bool) -> Self {
        Self {
            udp_payload_size: Self::DEFAULT_PAYLOAD_SIZE,
            dnssec_ok,
            client_subnet: None,
        }
    }

    /// 附带客户端子网
    pub fn with_client_subnet(mut self, subnet: ClientSubnet) -> Self {
        self.client_subnet = Some(subnet);
        self
    }
}

/// 响应中解析出的OPT记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsRecord {
    /// UDP载荷大小
    pub udp_payload_size: u16,
    /// 扩展RCODE
    pub extended_rcode: u8,
    /// EDNS版本
    pub version: u8,
    /// DO位(DNSSEC OK)
    pub dnssec_ok: bool,
    /// EDNS选项
    pub options: Vec<EdnsOption>,
}

/// EDNS选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdnsOption {
    /// 选项代码
    pub code: u16,
    /// 选项数据
    pub data: Vec<u8>,
}

/// EDNS选项代码常量
pub mod edns_option_codes {
    /// Client Subnet选项代码
    pub const CLIENT_SUBNET: u16 = 8;
}

/// EDNS客户端子网
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSubnet {
    /// 客户端IP地址
    pub address: IpAddr,
    /// 源前缀长度
    pub source_prefix_length: u8,
    /// 作用域前缀长度
    pub scope_prefix_length: u8,
}

impl ClientSubnet {
    /// 创建客户端子网，前缀长度按地址族截断
    pub fn new(address: IpAddr, source_prefix_length: u8) -> Self {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self {
            address,
            source_prefix_length: source_prefix_length.min(max),
            scope_prefix_length: 0,
        }
    }

    /// 地址族代码 (1=IPv4, 2=IPv6)
    pub fn family(&self) -> u16 {
        match self.address {
            IpAddr::V4(_) => 1,
            IpAddr::V6(_) => 2,
        }
    }

    /// 编码为EDNS选项数据，地址按前缀截断并清零多余的位
    ///
    /// 字段是公开的，超出地址宽度的前缀长度在这里再截断一次。
    pub fn encode(&self) -> Vec<u8> {
        let octets: Vec<u8> = match self.address {
            IpAddr::V4(addr) => addr.octets().to_vec(),
            IpAddr::V6(addr) => addr.octets().to_vec(),
        };
        let width = (octets.len() * 8) as u8;
        let source_prefix = self.source_prefix_length.min(width);
        let scope_prefix = self.scope_prefix_length.min(width);

        let mut data = Vec::with_capacity(20);
        data.extend_from_slice(&self.family().to_be_bytes());
        data.push(source_prefix);
        data.push(scope_prefix);

        let byte_count = (source_prefix as usize + 7) / 8;
        let mut prefix = octets[..byte_count].to_vec();
        let spare_bits = byte_count * 8 - source_prefix as usize;
        if let Some(last) = prefix.last_mut() {
            *last &= 0xFFu8 << spare_bits;
        }
        data.extend_from_slice(&prefix);
        data
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            41 => RecordType::OPT,
            _ => RecordType::Unknown(value),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::OPT => 41,
            RecordType::Unknown(value) => value,
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let rtype = match upper.as_str() {
            "A" => RecordType::A,
            "NS" => RecordType::NS,
            "CNAME" => RecordType::CNAME,
            "SOA" => RecordType::SOA,
            "PTR" => RecordType::PTR,
            "MX" => RecordType::MX,
            "TXT" => RecordType::TXT,
            "AAAA" => RecordType::AAAA,
            "SRV" => RecordType::SRV,
            "OPT" => RecordType::OPT,
            other => match other.strip_prefix("TYPE").map(str::parse::<u16>) {
                Some(Ok(value)) => RecordType::from(value),
                _ => return Err(format!("unknown record type: {}", s)),
            },
        };
        Ok(rtype)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::OPT => write!(f, "OPT"),
            RecordType::Unknown(value) => write!(f, "TYPE{}", value),
        }
    }
}

impl From<u16> for QClass {
    fn from(value: u16) -> Self {
        match value {
            1 => QClass::IN,
            3 => QClass::CH,
            4 => QClass::HS,
            255 => QClass::ANY,
            _ => QClass::Unknown(value),
        }
    }
}

impl From<QClass> for u16 {
    fn from(qclass: QClass) -> Self {
        match qclass {
            QClass::IN => 1,
            QClass::CH => 3,
            QClass::HS => 4,
            QClass::ANY => 255,
            QClass::Unknown(value) => value,
        }
    }
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            _ => ResponseCode::Unknown(value),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(rcode: ResponseCode) -> Self {
        match rcode {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NxDomain => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Unknown(value) => value,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::NoError => write!(f, "NOERROR"),
            ResponseCode::FormatError => write!(f, "FORMERR"),
            ResponseCode::ServerFailure => write!(f, "SERVFAIL"),
            ResponseCode::NxDomain => write!(f, "NXDOMAIN"),
            ResponseCode::NotImplemented => write!(f, "NOTIMP"),
            ResponseCode::Refused => write!(f, "REFUSED"),
            ResponseCode::Unknown(value) => write!(f, "RCODE{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_name_normalization() {
        let query = Query::new("  WWW.Example.COM. ", RecordType::A);
        assert_eq!(query.name(), "www.example.com");
        assert_eq!(query.qclass(), QClass::IN);
    }

    #[test]
    fn test_regenerate_id_keeps_question() {
        let query = Query::new("example.com", RecordType::MX);
        let next = query.regenerate_id();
        assert_eq!(next.question(), query.question());
    }

    #[test]
    fn test_flags_bits() {
        let flags = Flags::from_u16(0x8183);
        assert!(flags.qr);
        assert!(flags.rd);
        assert!(flags.ra);
        assert_eq!(ResponseCode::from(flags.rcode), ResponseCode::NxDomain);
        assert_eq!(flags.to_u16(), 0x8183);
    }

    #[test]
    fn test_record_type_parse() {
        assert_eq!("aaaa".parse::<RecordType>(), Ok(RecordType::AAAA));
        assert_eq!("TYPE257".parse::<RecordType>(), Ok(RecordType::Unknown(257)));
        assert_eq!("TYPE15".parse::<RecordType>(), Ok(RecordType::MX));
        assert!("BOGUS".parse::<RecordType>().is_err());
        assert_eq!(RecordType::Unknown(257).to_string(), "TYPE257");
    }

    #[test]
    fn test_client_subnet_encoding_masks_prefix() {
        let subnet = ClientSubnet::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77)), 20);
        let data = subnet.encode();
        assert_eq!(&data[..4], &[0, 1, 20, 0]);
        assert_eq!(&data[4..], &[192, 168, 0]);
    }

    #[test]
    fn test_client_subnet_oversized_prefix_is_clamped() {
        let subnet = ClientSubnet {
            address: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)),
            source_prefix_length: 40,
            scope_prefix_length: 200,
        };
        let data = subnet.encode();
        assert_eq!(&data[..4], &[0, 1, 32, 32]);
        assert_eq!(&data[4..], &[203, 0, 113, 9]);

        let query = Query::new("example.com", RecordType::A).with_edns(Edns::new(false).with_client_subnet(subnet));
        assert!(crate::codec::Codec::new().encode(&query).is_ok());
    }
}
