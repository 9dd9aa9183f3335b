//! DNS响应构建器
//!
//! 以链式调用构造 [`Response`]，再通过 [`Codec::encode_response`] 得到线上格式。
//! 主要用于桩DoH服务器和测试。

use crate::codec::Codec;
use crate::error::EncodeError;
use crate::types::*;
use std::net::{Ipv4Addr, Ipv6Addr};

/// DNS响应构建器
#[derive(Debug, Clone)]
pub struct DnsResponseBuilder {
    /// 事务ID
    id: u16,
    /// 标志位
    flags: Flags,
    /// 回显的问题
    queries: Vec<Question>,
    /// 回答记录
    answers: Vec<ResourceRecord>,
    /// 权威记录
    authorities: Vec<ResourceRecord>,
    /// 附加记录
    additionals: Vec<ResourceRecord>,
}

impl Default for DnsResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResponseBuilder {
    /// 创建新的DNS响应构建器
    pub fn new() -> Self {
        Self {
            id: 0,
            flags: Flags {
                qr: true,  // 响应
                opcode: 0, // 标准查询
                aa: false,
                tc: false,
                rd: true,
                ra: true,
                z: 0,
                rcode: 0,
            },
            queries: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// 以查询的事务ID和问题开始构造应答
    pub fn for_query(query: &Query) -> Self {
        Self::new()
            .with_id(query.id())
            .add_query(query.name(), query.qtype(), query.qclass())
    }

    /// 以已解码请求报文的事务ID和问题开始构造应答
    pub fn reply_to(request: &Response) -> Self {
        let mut builder = Self::new().with_id(request.id);
        builder.flags.rd = request.flags.rd;
        builder.queries = request.queries.clone();
        builder
    }

    /// 设置事务ID
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// 设置响应码
    pub fn with_response_code(mut self, rcode: ResponseCode) -> Self {
        self.flags.rcode = u8::from(rcode);
        self
    }

    /// 设置权威回答标志
    pub fn with_authoritative(mut self, aa: bool) -> Self {
        self.flags.aa = aa;
        self
    }

    /// 设置截断标志
    pub fn with_truncated(mut self, tc: bool) -> Self {
        self.flags.tc = tc;
        self
    }

    /// 覆盖全部标志位
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// 添加查询问题
    pub fn add_query(mut self, name: &str, qtype: RecordType, qclass: QClass) -> Self {
        self.queries.push(Question {
            name: name.to_string(),
            qtype,
            qclass,
        });
        self
    }

    /// 添加任意记录到回答部分
    pub fn add_answer(mut self, record: ResourceRecord) -> Self {
        self.answers.push(record);
        self
    }

    fn answer(self, name: &str, rtype: RecordType, ttl: u32, data: RecordData) -> Self {
        self.add_answer(ResourceRecord {
            name: name.to_string(),
            rtype,
            class: QClass::IN,
            ttl,
            data,
        })
    }

    /// 添加A记录到回答部分
    pub fn add_a_answer(self, name: &str, ttl: u32, ip: Ipv4Addr) -> Self {
        self.answer(name, RecordType::A, ttl, RecordData::A(ip))
    }

    /// 添加AAAA记录到回答部分
    pub fn add_aaaa_answer(self, name: &str, ttl: u32, ip: Ipv6Addr) -> Self {
        self.answer(name, RecordType::AAAA, ttl, RecordData::AAAA(ip))
    }

    /// 添加CNAME记录到回答部分
    pub fn add_cname_answer(self, name: &str, ttl: u32, target: &str) -> Self {
        self.answer(name, RecordType::CNAME, ttl, RecordData::CNAME(target.to_string()))
    }

    /// 添加MX记录到回答部分
    pub fn add_mx_answer(self, name: &str, ttl: u32, priority: u16, exchange: &str) -> Self {
        self.answer(
            name,
            RecordType::MX,
            ttl,
            RecordData::MX {
                priority,
                exchange: exchange.to_string(),
            },
        )
    }

    /// 添加TXT记录到回答部分
    pub fn add_txt_answer(self, name: &str, ttl: u32, texts: Vec<String>) -> Self {
        self.answer(name, RecordType::TXT, ttl, RecordData::TXT(texts))
    }

    /// 添加SRV记录到回答部分
    pub fn add_srv_answer(self, name: &str, ttl: u32, priority: u16, weight: u16, port: u16, target: &str) -> Self {
        self.answer(
            name,
            RecordType::SRV,
            ttl,
            RecordData::SRV {
                priority,
                weight,
                port,
                target: target.to_string(),
            },
        )
    }

    /// 添加权威记录
    pub fn add_authority(mut self, record: ResourceRecord) -> Self {
        self.authorities.push(record);
        self
    }

    /// 添加SOA记录到权威部分（NXDOMAIN/NODATA应答使用）
    pub fn add_soa_authority(self, zone: &str, ttl: u32, mname: &str, rname: &str, minimum: u32) -> Self {
        self.add_authority(ResourceRecord {
            name: zone.to_string(),
            rtype: RecordType::SOA,
            class: QClass::IN,
            ttl,
            data: RecordData::SOA {
                mname: mname.to_string(),
                rname: rname.to_string(),
                serial: 1,
                refresh: 3600,
                retry: 1800,
                expire: 604800,
                minimum,
            },
        })
    }

    /// 添加附加记录
    pub fn add_additional(mut self, record: ResourceRecord) -> Self {
        self.additionals.push(record);
        self
    }

    /// 构建DNS响应
    pub fn build(self) -> Response {
        Response {
            id: self.id,
            flags: self.flags,
            queries: self.queries,
            answers: self.answers,
            authorities: self.authorities,
            additionals: self.additionals,
        }
    }

    /// 构建并编码为线上格式
    pub fn to_wire(self) -> Result<WireMessage, EncodeError> {
        Codec::new().encode_response(&self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_response_builder() {
        let response = DnsResponseBuilder::new()
            .with_id(12345)
            .with_authoritative(true)
            .add_query("example.com", RecordType::A, QClass::IN)
            .add_a_answer("example.com", 300, Ipv4Addr::new(192, 168, 1, 1))
            .build();

        assert_eq!(response.id, 12345);
        assert!(response.flags.qr);
        assert!(response.flags.aa);
        assert_eq!(response.rcode(), ResponseCode::NoError);
        assert_eq!(response.queries[0].name, "example.com");
        assert_eq!(response.ip_addrs(), vec![std::net::IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))]);
    }

    #[test]
    fn test_for_query_echoes_question() {
        let query = Query::new("Example.COM.", RecordType::AAAA);
        let response = DnsResponseBuilder::for_query(&query)
            .with_response_code(ResponseCode::NxDomain)
            .build();

        assert_eq!(response.id, query.id());
        assert_eq!(response.rcode(), ResponseCode::NxDomain);
        assert!(response.queries[0].matches(&query));
    }

    #[test]
    fn test_to_wire_decodes_back() {
        let wire = DnsResponseBuilder::new()
            .with_id(7)
            .add_query("example.com", RecordType::MX, QClass::IN)
            .add_mx_answer("example.com", 3600, 10, "mail.example.com")
            .add_soa_authority("example.com", 60, "ns1.example.com", "admin.example.com", 300)
            .to_wire()
            .unwrap();

        let decoded = Codec::new().decode(wire.as_bytes()).unwrap();
        assert_eq!(decoded.id, 7);
        assert_eq!(
            decoded.answers[0].data,
            RecordData::MX {
                priority: 10,
                exchange: "mail.example.com".to_string()
            }
        );
        assert!(matches!(decoded.authorities[0].data, RecordData::SOA { minimum: 300, .. }));
    }
}
