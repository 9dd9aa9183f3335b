//! DNS报文编解码 (RFC 1035)
//!
//! 纯函数式转换：`Query -> WireMessage`，`&[u8] -> Response`。不做任何I/O，也不记录日志。

use std::collections::HashMap;

use crate::error::{DecodeError, EncodeError, Section};
use crate::types::{
    Flags, Query, QClass, Question, RecordData, RecordType, ResourceRecord, Response, WireMessage,
};

pub mod rdata;

pub use rdata::{RdataContext, RdataDecoder};

/// DNS报文最大长度
pub const MAX_MESSAGE_SIZE: usize = 65535;
/// 域名最大线上长度
pub const MAX_NAME_LEN: usize = 255;
/// 标签最大长度
pub const MAX_LABEL_LEN: usize = 63;

const HEADER_LEN: usize = 12;
// 根名称 + 类型 + 类别
const MIN_QUESTION_LEN: usize = 5;
// 根名称 + 类型 + 类别 + TTL + RDLENGTH
const MIN_RECORD_LEN: usize = 11;
const MAX_POINTER_HOPS: usize = 64;

/// 报文编解码器
///
/// 持有按记录类型分派的rdata解码表，可通过 [`Codec::register_decoder`] 扩展。
#[derive(Debug, Clone)]
pub struct Codec {
    decoders: HashMap<RecordType, RdataDecoder>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// 创建带内置解码器的编解码器
    pub fn new() -> Self {
        Self {
            decoders: rdata::default_decoders(),
        }
    }

    /// 注册或替换某个记录类型的解码器，返回被替换的旧解码器
    pub fn register_decoder(&mut self, rtype: RecordType, decoder: RdataDecoder) -> Option<RdataDecoder> {
        self.decoders.insert(rtype, decoder)
    }

    /// 将查询编码为线上格式
    ///
    /// 单个问题，RD位置位，事务ID取自查询本身。
    pub fn encode(&self, query: &Query) -> Result<WireMessage, EncodeError> {
        let mut buffer = Vec::with_capacity(512);
        let additional_count: u16 = if query.edns().is_some() { 1 } else { 0 };

        buffer.extend_from_slice(&query.id().to_be_bytes());
        buffer.extend_from_slice(&Flags::default().to_u16().to_be_bytes());
        buffer.extend_from_slice(&1u16.to_be_bytes());
        buffer.extend_from_slice(&0u16.to_be_bytes());
        buffer.extend_from_slice(&0u16.to_be_bytes());
        buffer.extend_from_slice(&additional_count.to_be_bytes());

        encode_name(query.name(), &mut buffer)?;
        buffer.extend_from_slice(&u16::from(query.qtype()).to_be_bytes());
        buffer.extend_from_slice(&u16::from(query.qclass()).to_be_bytes());

        if let Some(edns) = query.edns() {
            // OPT: 根名称, TYPE=41, CLASS=载荷大小, TTL=扩展RCODE/版本/DO位
            buffer.push(0);
            buffer.extend_from_slice(&u16::from(RecordType::OPT).to_be_bytes());
            buffer.extend_from_slice(&edns.udp_payload_size.to_be_bytes());
            let ttl: u32 = if edns.dnssec_ok { 0x8000 } else { 0 };
            buffer.extend_from_slice(&ttl.to_be_bytes());

            let mut options = Vec::new();
            if let Some(subnet) = &edns.client_subnet {
                let data = subnet.encode();
                options.extend_from_slice(&crate::types::edns_option_codes::CLIENT_SUBNET.to_be_bytes());
                options.extend_from_slice(&(data.len() as u16).to_be_bytes());
                options.extend_from_slice(&data);
            }
            buffer.extend_from_slice(&(options.len() as u16).to_be_bytes());
            buffer.extend_from_slice(&options);
        }

        if buffer.len() > MAX_MESSAGE_SIZE {
            return Err(EncodeError::MessageTooLarge(buffer.len()));
        }
        Ok(WireMessage::new(query.id(), buffer))
    }

    /// 将响应编码为线上格式（不压缩名称）
    ///
    /// 主要用于构造测试和桩服务器的应答。
    pub fn encode_response(&self, response: &Response) -> Result<WireMessage, EncodeError> {
        let mut buffer = Vec::with_capacity(512);

        buffer.extend_from_slice(&response.id.to_be_bytes());
        buffer.extend_from_slice(&response.flags.to_u16().to_be_bytes());
        for count in [
            response.queries.len(),
            response.answers.len(),
            response.authorities.len(),
            response.additionals.len(),
        ] {
            let count = u16::try_from(count).map_err(|_| EncodeError::MessageTooLarge(count))?;
            buffer.extend_from_slice(&count.to_be_bytes());
        }

        for question in &response.queries {
            encode_name(&question.name, &mut buffer)?;
            buffer.extend_from_slice(&u16::from(question.qtype).to_be_bytes());
            buffer.extend_from_slice(&u16::from(question.qclass).to_be_bytes());
        }

        for record in response
            .answers
            .iter()
            .chain(&response.authorities)
            .chain(&response.additionals)
        {
            encode_record(record, &mut buffer)?;
        }

        if buffer.len() > MAX_MESSAGE_SIZE {
            return Err(EncodeError::MessageTooLarge(buffer.len()));
        }
        Ok(WireMessage::new(response.id, buffer))
    }

    /// 解码线上格式的报文
    ///
    /// 顺序遍历各部分。压缩指针只允许指向当前名称之前的位置。
    pub fn decode(&self, bytes: &[u8]) -> Result<Response, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                offset: bytes.len(),
                needed: HEADER_LEN - bytes.len(),
            });
        }

        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let flags = Flags::from_u16(u16::from_be_bytes([bytes[2], bytes[3]]));
        let qdcount = u16::from_be_bytes([bytes[4], bytes[5]]);
        let ancount = u16::from_be_bytes([bytes[6], bytes[7]]);
        let nscount = u16::from_be_bytes([bytes[8], bytes[9]]);
        let arcount = u16::from_be_bytes([bytes[10], bytes[11]]);

        let mut offset = HEADER_LEN;

        check_count(Section::Question, qdcount, MIN_QUESTION_LEN, bytes.len() - offset)?;
        let mut queries = Vec::with_capacity(qdcount as usize);
        for _ in 0..qdcount {
            let (question, next) = parse_question(bytes, offset)?;
            queries.push(question);
            offset = next;
        }

        let mut sections: [(Section, u16, Vec<ResourceRecord>); 3] = [
            (Section::Answer, ancount, Vec::new()),
            (Section::Authority, nscount, Vec::new()),
            (Section::Additional, arcount, Vec::new()),
        ];
        for (section, count, records) in sections.iter_mut() {
            check_count(*section, *count, MIN_RECORD_LEN, bytes.len() - offset)?;
            records.reserve(*count as usize);
            for _ in 0..*count {
                let (record, next) = self.parse_record(bytes, offset)?;
                records.push(record);
                offset = next;
            }
        }
        let [(_, _, answers), (_, _, authorities), (_, _, additionals)] = sections;

        Ok(Response {
            id,
            flags,
            queries,
            answers,
            authorities,
            additionals,
        })
    }

    /// 解码针对某个查询的应答，并校验其与查询一致
    ///
    /// 要求QR位置位、事务ID相同、回显的问题与查询一致。
    pub fn decode_reply(&self, query: &Query, bytes: &[u8]) -> Result<Response, DecodeError> {
        let response = self.decode(bytes)?;
        if !response.flags.qr {
            return Err(DecodeError::NotAResponse);
        }
        if response.id != query.id() {
            return Err(DecodeError::IdMismatch {
                expected: query.id(),
                actual: response.id,
            });
        }
        match response.queries.as_slice() {
            [question] if question.matches(query) => Ok(response),
            _ => Err(DecodeError::QuestionMismatch),
        }
    }

    fn parse_record(&self, data: &[u8], offset: usize) -> Result<(ResourceRecord, usize), DecodeError> {
        let (name, mut offset) = read_name(data, offset)?;
        let fixed = slice(data, offset, 10)?;

        let rtype = RecordType::from(u16::from_be_bytes([fixed[0], fixed[1]]));
        let raw_class = u16::from_be_bytes([fixed[2], fixed[3]]);
        let raw_ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
        let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
        offset += 10;

        slice(data, offset, rdlength)?;
        let ctx = RdataContext::new(data, offset, rdlength, rtype, raw_class, raw_ttl);
        let decoder = self
            .decoders
            .get(&rtype)
            .copied()
            .unwrap_or(rdata::decode_unknown as RdataDecoder);
        let record_data = decoder(&ctx)?;
        offset += rdlength;

        // RFC 2181: 最高位置位的TTL按0处理；OPT记录的TTL字段另有含义
        let ttl = if matches!(record_data, RecordData::Opt(_)) || raw_ttl <= i32::MAX as u32 {
            raw_ttl
        } else {
            0
        };

        Ok((
            ResourceRecord {
                name,
                rtype,
                class: QClass::from(raw_class),
                ttl,
                data: record_data,
            },
            offset,
        ))
    }
}

/// 编码域名（不压缩）
///
/// 末尾的点被忽略，空名称编码为根。
pub fn encode_name(name: &str, buffer: &mut Vec<u8>) -> Result<(), EncodeError> {
    let name = name.trim_end_matches('.');
    if name.is_empty() {
        buffer.push(0);
        return Ok(());
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(EncodeError::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(EncodeError::LabelTooLong {
                label: label.to_string(),
                len: label.len(),
            });
        }
    }

    // 每个标签一个长度字节加上根终止符
    let wire_len = name.len() + 2;
    if wire_len > MAX_NAME_LEN {
        return Err(EncodeError::NameTooLong(wire_len));
    }

    for label in name.split('.') {
        buffer.push(label.len() as u8);
        buffer.extend_from_slice(label.as_bytes());
    }
    buffer.push(0);
    Ok(())
}

/// 从报文中读取域名，返回域名和名称之后的偏移
///
/// 每个压缩指针必须指向当前名称片段起点之前，跳转目标因此严格递减，不可能形成环。
pub fn read_name(message: &[u8], start: usize) -> Result<(String, usize), DecodeError> {
    let mut name = String::new();
    let mut wire_len = 1usize;
    let mut pos = start;
    let mut segment_start = start;
    let mut resume_at: Option<usize> = None;
    let mut hops = 0usize;

    loop {
        let len = *message.get(pos).ok_or(DecodeError::Truncated { offset: pos, needed: 1 })?;
        match len & 0xC0 {
            0x00 => {
                if len == 0 {
                    pos += 1;
                    break;
                }
                let len = len as usize;
                let label = slice(message, pos + 1, len)?;
                wire_len += len + 1;
                if wire_len > MAX_NAME_LEN {
                    return Err(DecodeError::NameTooLong);
                }
                if !name.is_empty() {
                    name.push('.');
                }
                name.push_str(&String::from_utf8_lossy(label));
                pos += 1 + len;
            }
            0xC0 => {
                let low = *message
                    .get(pos + 1)
                    .ok_or(DecodeError::Truncated { offset: pos + 1, needed: 1 })?;
                let target = (((len & 0x3F) as usize) << 8) | low as usize;
                if target >= segment_start {
                    return Err(DecodeError::BadPointer { at: pos, target });
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(DecodeError::TooManyPointers);
                }
                if resume_at.is_none() {
                    resume_at = Some(pos + 2);
                }
                pos = target;
                segment_start = target;
            }
            _ => return Err(DecodeError::InvalidLabel(len)),
        }
    }

    Ok((name, resume_at.unwrap_or(pos)))
}

fn encode_record(record: &ResourceRecord, buffer: &mut Vec<u8>) -> Result<(), EncodeError> {
    encode_name(&record.name, buffer)?;
    buffer.extend_from_slice(&u16::from(record.rtype).to_be_bytes());
    buffer.extend_from_slice(&u16::from(record.class).to_be_bytes());
    buffer.extend_from_slice(&record.ttl.to_be_bytes());

    let data = rdata::encode_rdata(&record.data)?;
    buffer.extend_from_slice(&(data.len() as u16).to_be_bytes());
    buffer.extend_from_slice(&data);
    Ok(())
}

fn parse_question(data: &[u8], offset: usize) -> Result<(Question, usize), DecodeError> {
    let (name, offset) = read_name(data, offset)?;
    let fixed = slice(data, offset, 4)?;
    let qtype = RecordType::from(u16::from_be_bytes([fixed[0], fixed[1]]));
    let qclass = QClass::from(u16::from_be_bytes([fixed[2], fixed[3]]));
    Ok((Question { name, qtype, qclass }, offset + 4))
}

fn check_count(section: Section, count: u16, min_len: usize, remaining: usize) -> Result<(), DecodeError> {
    if count as usize * min_len > remaining {
        return Err(DecodeError::CountMismatch { section, count, remaining });
    }
    Ok(())
}

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    data.get(offset..offset + len).ok_or(DecodeError::Truncated {
        offset,
        needed: (offset + len).saturating_sub(data.len()),
    })
}
