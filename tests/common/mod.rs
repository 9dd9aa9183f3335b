//! 集成测试共用的桩DoH服务器工具

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use std::net::Ipv4Addr;
use std::sync::Arc;

use rat_quickdoh::logger::SharedLogger;
use rat_quickdoh::transport::CONTENT_TYPE_DNS_MESSAGE;
use rat_quickdoh::{Codec, DnsResponseBuilder, Response, ResponseCode, SilentLogger};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::{MockServer, Request, ResponseTemplate};

pub const DOH_PATH: &str = "/dns-query";

pub fn silent() -> SharedLogger {
    Arc::new(SilentLogger)
}

pub fn endpoint_url(server: &MockServer) -> String {
    format!("{}{}", server.uri(), DOH_PATH)
}

/// 取出请求中的DNS报文（GET的 `dns` 参数或POST的请求体）
pub fn wire_query(request: &Request) -> Vec<u8> {
    match request.url.query_pairs().find(|(key, _)| key == "dns") {
        Some((_, value)) => general_purpose::URL_SAFE_NO_PAD
            .decode(value.as_bytes())
            .expect("dns parameter is not base64url"),
        None => request.body.clone(),
    }
}

pub fn decode_request(request: &Request) -> Response {
    Codec::new()
        .decode(&wire_query(request))
        .expect("stub received an invalid DNS query")
}

pub fn dns_reply(response: &Response) -> ResponseTemplate {
    let wire = Codec::new().encode_response(response).expect("stub reply must encode");
    ResponseTemplate::new(200)
        .insert_header("content-type", CONTENT_TYPE_DNS_MESSAGE)
        .set_body_bytes(wire.as_bytes().to_vec())
}

/// 回显问题并给出一条A记录
pub fn a_record(ip: Ipv4Addr, ttl: u32) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    move |request: &Request| {
        let query = decode_request(request);
        let name = query.queries[0].name.clone();
        dns_reply(&DnsResponseBuilder::reply_to(&query).add_a_answer(&name, ttl, ip).build())
    }
}

/// 回显问题，返回带SOA的NXDOMAIN
pub fn nxdomain(soa_ttl: u32, minimum: u32) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    move |request: &Request| {
        let query = decode_request(request);
        dns_reply(
            &DnsResponseBuilder::reply_to(&query)
                .with_response_code(ResponseCode::NxDomain)
                .add_soa_authority("example.com", soa_ttl, "ns1.example.com", "hostmaster.example.com", minimum)
                .build(),
        )
    }
}

/// 事务ID与请求不符的应答
pub fn wrong_id() -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    |request: &Request| {
        let query = decode_request(request);
        dns_reply(&DnsResponseBuilder::reply_to(&query).with_id(!query.id).build())
    }
}

/// 不带Content-Length、以分块编码返回 `total` 字节DNS报文体的HTTP/1.1服务器
///
/// 只处理一个连接，只读请求头（用于GET），返回端点URL。
pub async fn chunked_body_server(total: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: {}\r\ntransfer-encoding: chunked\r\n\r\n",
            CONTENT_TYPE_DNS_MESSAGE
        );
        if stream.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        let chunk = vec![0u8; 8192];
        let mut sent = 0;
        while sent < total {
            let len = chunk.len().min(total - sent);
            let frame = format!("{:x}\r\n", len);
            // 客户端超限后断开，写失败即结束
            if stream.write_all(frame.as_bytes()).await.is_err()
                || stream.write_all(&chunk[..len]).await.is_err()
                || stream.write_all(b"\r\n").await.is_err()
            {
                return;
            }
            sent += len;
        }
        let _ = stream.write_all(b"0\r\n\r\n").await;
    });

    format!("http://{}{}", addr, DOH_PATH)
}
