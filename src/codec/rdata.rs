//! 按记录类型分派的rdata编解码表
//!
//! 解码器以 `RecordType -> RdataDecoder` 查表的方式注册，
//! 解码主循环不需要了解任何具体记录类型。

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{encode_name, read_name};
use crate::error::{DecodeError, EncodeError};
use crate::types::{EdnsOption, EdnsRecord, RecordData, RecordType};

/// rdata解码函数
pub type RdataDecoder = fn(&RdataContext<'_>) -> Result<RecordData, DecodeError>;

/// 单条记录的rdata及其所在报文
///
/// 名称字段可能含有压缩指针，因此解码器需要访问完整报文。
#[derive(Debug, Clone, Copy)]
pub struct RdataContext<'a> {
    message: &'a [u8],
    offset: usize,
    len: usize,
    rtype: RecordType,
    class: u16,
    ttl: u32,
}

impl<'a> RdataContext<'a> {
    pub(crate) fn new(
        message: &'a [u8],
        offset: usize,
        len: usize,
        rtype: RecordType,
        class: u16,
        ttl: u32,
    ) -> Self {
        Self { message, offset, len, rtype, class, ttl }
    }

    /// rdata原始字节
    pub fn rdata(&self) -> &'a [u8] {
        &self.message[self.offset..self.offset + self.len]
    }

    /// 记录类型
    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    /// 记录类别原始值（OPT记录中为UDP载荷大小）
    pub fn class(&self) -> u16 {
        self.class
    }

    /// 原始TTL字段（OPT记录中为扩展RCODE/版本/标志）
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// 从rdata内的相对位置读取域名，返回域名和其后的相对位置
    pub fn read_name(&self, relative: usize) -> Result<(String, usize), DecodeError> {
        if relative >= self.len {
            return Err(self.invalid("name starts past end of rdata"));
        }
        let (name, next) = read_name(self.message, self.offset + relative)?;
        let next = next - self.offset;
        if next > self.len {
            return Err(self.invalid("name overruns rdata"));
        }
        Ok((name, next))
    }

    /// 从rdata内的相对位置读取u16
    pub fn read_u16(&self, relative: usize) -> Result<u16, DecodeError> {
        let bytes = self
            .rdata()
            .get(relative..relative + 2)
            .ok_or_else(|| self.invalid("short rdata"))?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// 从rdata内的相对位置读取u32
    pub fn read_u32(&self, relative: usize) -> Result<u32, DecodeError> {
        let bytes = self
            .rdata()
            .get(relative..relative + 4)
            .ok_or_else(|| self.invalid("short rdata"))?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// 构造该记录类型的 `InvalidRdata` 错误
    pub fn invalid(&self, reason: &str) -> DecodeError {
        DecodeError::InvalidRdata {
            rtype: self.rtype,
            reason: reason.to_string(),
        }
    }

    fn expect_consumed(&self, consumed: usize) -> Result<(), DecodeError> {
        if consumed != self.len {
            return Err(self.invalid("trailing bytes in rdata"));
        }
        Ok(())
    }
}

/// 内置解码器表
pub(crate) fn default_decoders() -> HashMap<RecordType, RdataDecoder> {
    let mut table: HashMap<RecordType, RdataDecoder> = HashMap::new();
    table.insert(RecordType::A, decode_a);
    table.insert(RecordType::AAAA, decode_aaaa);
    table.insert(RecordType::CNAME, decode_single_name);
    table.insert(RecordType::NS, decode_single_name);
    table.insert(RecordType::PTR, decode_single_name);
    table.insert(RecordType::MX, decode_mx);
    table.insert(RecordType::TXT, decode_txt);
    table.insert(RecordType::SOA, decode_soa);
    table.insert(RecordType::SRV, decode_srv);
    table.insert(RecordType::OPT, decode_opt);
    table
}

/// 未注册类型的兜底：保留原始字节
pub(crate) fn decode_unknown(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    Ok(RecordData::Unknown(ctx.rdata().to_vec()))
}

fn decode_a(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let rdata = ctx.rdata();
    let octets: [u8; 4] = rdata
        .try_into()
        .map_err(|_| ctx.invalid("A record must be 4 octets"))?;
    Ok(RecordData::A(Ipv4Addr::from(octets)))
}

fn decode_aaaa(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let rdata = ctx.rdata();
    let octets: [u8; 16] = rdata
        .try_into()
        .map_err(|_| ctx.invalid("AAAA record must be 16 octets"))?;
    Ok(RecordData::AAAA(Ipv6Addr::from(octets)))
}

fn decode_single_name(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let (name, consumed) = ctx.read_name(0)?;
    ctx.expect_consumed(consumed)?;
    match ctx.rtype() {
        RecordType::CNAME => Ok(RecordData::CNAME(name)),
        RecordType::NS => Ok(RecordData::NS(name)),
        RecordType::PTR => Ok(RecordData::PTR(name)),
        _ => Err(ctx.invalid("not a single-name record type")),
    }
}

fn decode_mx(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let priority = ctx.read_u16(0)?;
    let (exchange, consumed) = ctx.read_name(2)?;
    ctx.expect_consumed(consumed)?;
    Ok(RecordData::MX { priority, exchange })
}

fn decode_txt(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let rdata = ctx.rdata();
    let mut texts = Vec::new();
    let mut offset = 0;
    while offset < rdata.len() {
        let len = rdata[offset] as usize;
        offset += 1;
        let chunk = rdata
            .get(offset..offset + len)
            .ok_or_else(|| ctx.invalid("character-string overruns rdata"))?;
        texts.push(String::from_utf8_lossy(chunk).into_owned());
        offset += len;
    }
    Ok(RecordData::TXT(texts))
}

fn decode_soa(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let (mname, next) = ctx.read_name(0)?;
    let (rname, next) = ctx.read_name(next)?;
    let serial = ctx.read_u32(next)?;
    let refresh = ctx.read_u32(next + 4)?;
    let retry = ctx.read_u32(next + 8)?;
    let expire = ctx.read_u32(next + 12)?;
    let minimum = ctx.read_u32(next + 16)?;
    ctx.expect_consumed(next + 20)?;
    Ok(RecordData::SOA { mname, rname, serial, refresh, retry, expire, minimum })
}

fn decode_srv(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let priority = ctx.read_u16(0)?;
    let weight = ctx.read_u16(2)?;
    let port = ctx.read_u16(4)?;
    let (target, consumed) = ctx.read_name(6)?;
    ctx.expect_consumed(consumed)?;
    Ok(RecordData::SRV { priority, weight, port, target })
}

fn decode_opt(ctx: &RdataContext<'_>) -> Result<RecordData, DecodeError> {
    let ttl = ctx.ttl();
    let mut options = Vec::new();
    let mut offset = 0;
    while offset < ctx.rdata().len() {
        let code = ctx.read_u16(offset)?;
        let len = ctx.read_u16(offset + 2)? as usize;
        offset += 4;
        let data = ctx
            .rdata()
            .get(offset..offset + len)
            .ok_or_else(|| ctx.invalid("option overruns rdata"))?;
        options.push(EdnsOption { code, data: data.to_vec() });
        offset += len;
    }
    Ok(RecordData::Opt(EdnsRecord {
        udp_payload_size: ctx.class(),
        extended_rcode: (ttl >> 24) as u8,
        version: (ttl >> 16) as u8,
        dnssec_ok: (ttl & 0x8000) != 0,
        options,
    }))
}

/// 编码记录数据（不做名称压缩）
pub(crate) fn encode_rdata(data: &RecordData) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    match data {
        RecordData::A(ip) => buffer.extend_from_slice(&ip.octets()),
        RecordData::AAAA(ip) => buffer.extend_from_slice(&ip.octets()),
        RecordData::CNAME(name) | RecordData::NS(name) | RecordData::PTR(name) => {
            encode_name(name, &mut buffer)?;
        }
        RecordData::MX { priority, exchange } => {
            buffer.extend_from_slice(&priority.to_be_bytes());
            encode_name(exchange, &mut buffer)?;
        }
        RecordData::TXT(texts) => {
            for text in texts {
                if text.len() > 255 {
                    return Err(EncodeError::InvalidRdata {
                        rtype: RecordType::TXT,
                        reason: "character-string longer than 255 octets".to_string(),
                    });
                }
                buffer.push(text.len() as u8);
                buffer.extend_from_slice(text.as_bytes());
            }
        }
        RecordData::SOA { mname, rname, serial, refresh, retry, expire, minimum } => {
            encode_name(mname, &mut buffer)?;
            encode_name(rname, &mut buffer)?;
            for value in [serial, refresh, retry, expire, minimum] {
                buffer.extend_from_slice(&value.to_be_bytes());
            }
        }
        RecordData::SRV { priority, weight, port, target } => {
            buffer.extend_from_slice(&priority.to_be_bytes());
            buffer.extend_from_slice(&weight.to_be_bytes());
            buffer.extend_from_slice(&port.to_be_bytes());
            encode_name(target, &mut buffer)?;
        }
        RecordData::Opt(record) => {
            for option in &record.options {
                buffer.extend_from_slice(&option.code.to_be_bytes());
                buffer.extend_from_slice(&(option.data.len() as u16).to_be_bytes());
                buffer.extend_from_slice(&option.data);
            }
        }
        RecordData::Unknown(raw) => buffer.extend_from_slice(raw),
    }
    if buffer.len() > u16::MAX as usize {
        return Err(EncodeError::MessageTooLarge(buffer.len()));
    }
    Ok(buffer)
}
