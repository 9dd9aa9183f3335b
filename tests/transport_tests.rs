//! HTTPS传输绑定测试（桩DoH服务器）

mod common;

use base64::{engine::general_purpose, Engine as _};
use std::net::Ipv4Addr;
use std::time::Duration;

use rat_quickdoh::codec::MAX_MESSAGE_SIZE;
use rat_quickdoh::transport::{HttpsConfig, CONTENT_TYPE_DNS_MESSAGE, MAX_GET_PARAM_LEN};
use rat_quickdoh::{
    Codec, DnsResponseBuilder, EndpointConfig, HttpMethod, HttpsTransport, QClass, Query, RecordType,
    Transport, TransportError,
};
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{a_record, chunked_body_server, endpoint_url, silent, DOH_PATH};

fn transport() -> HttpsTransport {
    HttpsTransport::new(HttpsConfig::default(), silent()).unwrap()
}

fn endpoint(server: &MockServer, method: HttpMethod) -> EndpointConfig {
    EndpointConfig::new(&endpoint_url(server))
        .unwrap()
        .with_method(method)
        .with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_get_carries_base64url_dns_parameter() {
    let server = MockServer::start().await;
    let codec = Codec::new();
    let query = Query::new("example.com", RecordType::A);
    let message = codec.encode(&query).unwrap();
    let encoded = general_purpose::URL_SAFE_NO_PAD.encode(message.as_bytes());

    Mock::given(method("GET"))
        .and(path(DOH_PATH))
        .and(query_param("dns", encoded.as_str()))
        .and(header("accept", CONTENT_TYPE_DNS_MESSAGE))
        .respond_with(a_record(Ipv4Addr::new(93, 184, 216, 34), 300))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = transport()
        .send(&message, &endpoint(&server, HttpMethod::GET))
        .await
        .unwrap();
    let response = codec.decode_reply(&query, &bytes).unwrap();
    assert_eq!(response.answers[0].ttl, 300);
}

#[tokio::test]
async fn test_post_sends_raw_message_body() {
    let server = MockServer::start().await;
    let codec = Codec::new();
    let query = Query::new("example.org", RecordType::AAAA);
    let message = codec.encode(&query).unwrap();

    Mock::given(method("POST"))
        .and(path(DOH_PATH))
        .and(header("content-type", CONTENT_TYPE_DNS_MESSAGE))
        .and(header("accept", CONTENT_TYPE_DNS_MESSAGE))
        .and(body_bytes(message.as_bytes().to_vec()))
        .respond_with(a_record(Ipv4Addr::new(10, 0, 0, 1), 60))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = transport()
        .send(&message, &endpoint(&server, HttpMethod::POST))
        .await
        .unwrap();
    let response = codec.decode_reply(&query, &bytes).unwrap();
    assert_eq!(response.id, query.id());
}

#[tokio::test]
async fn test_auto_uses_get_for_small_messages() {
    let server = MockServer::start().await;
    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();

    Mock::given(method("GET"))
        .and(path(DOH_PATH))
        .respond_with(a_record(Ipv4Addr::LOCALHOST, 30))
        .expect(1)
        .mount(&server)
        .await;

    transport()
        .send(&message, &endpoint(&server, HttpMethod::Auto))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(path(DOH_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let err = transport()
        .send(&message, &endpoint(&server, HttpMethod::POST))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::HttpStatus { status: 500, .. }));
    assert_eq!(err.kind(), "HttpStatusError");
}

#[tokio::test]
async fn test_wrong_content_type_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(path(DOH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/dns-json")
                .set_body_string("{\"Status\":0}"),
        )
        .mount(&server)
        .await;

    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let err = transport()
        .send(&message, &endpoint(&server, HttpMethod::GET))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::ContentTypeMismatch {
            found: "application/dns-json".to_string()
        }
    );
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(path(DOH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", CONTENT_TYPE_DNS_MESSAGE)
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let endpoint = EndpointConfig::new(&endpoint_url(&server))
        .unwrap()
        .with_timeout(Duration::from_millis(100));
    let err = transport().send(&message, &endpoint).await.unwrap_err();
    assert_eq!(err, TransportError::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn test_oversized_get_is_refused_before_sending() {
    let server = MockServer::start().await;
    Mock::given(path(DOH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut builder = DnsResponseBuilder::new().add_query("big.example", RecordType::TXT, QClass::IN);
    for _ in 0..30 {
        builder = builder.add_txt_answer("big.example", 60, vec!["x".repeat(255)]);
    }
    let message = builder.to_wire().unwrap();

    let err = transport()
        .send(&message, &endpoint(&server, HttpMethod::GET))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::PayloadTooLarge { limit: MAX_GET_PARAM_LEN, .. }
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() {
    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let endpoint = EndpointConfig::new("http://127.0.0.1:1/dns-query")
        .unwrap()
        .with_timeout(Duration::from_secs(2));
    let err = transport().send(&message, &endpoint).await.unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));
}

#[tokio::test]
async fn test_oversized_response_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(path(DOH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", CONTENT_TYPE_DNS_MESSAGE)
                .set_body_bytes(vec![0u8; MAX_MESSAGE_SIZE + 1]),
        )
        .mount(&server)
        .await;

    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let err = transport()
        .send(&message, &endpoint(&server, HttpMethod::POST))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::PayloadTooLarge {
            size: MAX_MESSAGE_SIZE + 1,
            limit: MAX_MESSAGE_SIZE,
        }
    );
}

#[tokio::test]
async fn test_oversized_chunked_body_stops_reading_at_limit() {
    let url = chunked_body_server(MAX_MESSAGE_SIZE * 4).await;
    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let endpoint = EndpointConfig::new(&url)
        .unwrap()
        .with_method(HttpMethod::GET)
        .with_timeout(Duration::from_secs(5));

    let err = transport().send(&message, &endpoint).await.unwrap_err();
    match err {
        TransportError::PayloadTooLarge { size, limit } => {
            assert_eq!(limit, MAX_MESSAGE_SIZE);
            assert!(size > MAX_MESSAGE_SIZE);
            assert!(size < MAX_MESSAGE_SIZE * 4);
        }
        other => panic!("expected PayloadTooLarge, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chunked_body_within_limit_is_accepted() {
    let url = chunked_body_server(20_000).await;
    let message = Codec::new().encode(&Query::new("example.com", RecordType::A)).unwrap();
    let endpoint = EndpointConfig::new(&url)
        .unwrap()
        .with_method(HttpMethod::GET)
        .with_timeout(Duration::from_secs(5));

    let body = transport().send(&message, &endpoint).await.unwrap();
    assert_eq!(body.len(), 20_000);
}
