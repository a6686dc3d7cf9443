use barrage_http::{
    AuthSpec, FailureKind, Headers, HttpMethod, HttpTransport, ReqwestTransport, RequestSpec,
    TransportConfig,
};
use std::time::Duration;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(&TransportConfig::default()).unwrap()
}

#[tokio::test]
async fn test_send_captures_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-cache", "HIT")
                .set_body_string(r#"{"items": [1, 2, 3]}"#),
        )
        .mount(&server)
        .await;

    let request = RequestSpec::new(&format!("{}/items", server.uri())).unwrap();
    let response = transport().send(&request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.headers.first("X-Cache"), Some("HIT"));
    assert_eq!(&response.body[..], br#"{"items": [1, 2, 3]}"#);
}

#[tokio::test]
async fn test_error_status_is_still_a_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
        .mount(&server)
        .await;

    let request = RequestSpec::new(&server.uri()).unwrap();
    let response = transport().send(&request).await.unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(&response.body[..], b"missing");
}

#[tokio::test]
async fn test_milestones_are_ordered_on_fresh_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let request = RequestSpec::new(&server.uri()).unwrap();
    let timing = transport().send(&request).await.unwrap().timing;

    // IP literal: no lookup, but the connect hook must fire
    assert_eq!(timing.dns, 0.0);
    assert!(timing.connect > 0.0);
    assert!(timing.connect <= timing.tls);
    assert!(timing.tls <= timing.first_byte);
    assert!(timing.first_byte <= timing.total);
    assert!(timing.first_byte >= 0.02);
}

#[tokio::test]
async fn test_hostname_lookup_is_timed_and_reuse_skips_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("http://localhost:{}/", server.address().port());
    let request = RequestSpec::new(&url).unwrap();
    let transport = transport();

    let fresh = transport.send(&request).await.unwrap().timing;
    assert!(fresh.dns > 0.0);
    assert!(fresh.connect > fresh.dns);
    assert!(fresh.connect <= fresh.first_byte);

    let reused = transport.send(&request).await.unwrap().timing;
    assert_eq!(reused.dns, 0.0);
    assert_eq!(reused.connect, 0.0);
    assert_eq!(reused.tls, 0.0);
    assert!(reused.first_byte > 0.0);
}

#[tokio::test]
async fn test_post_sends_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer secret"))
        .and(body_string(r#"{"qty":1}"#))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut headers = Headers::new();
    headers.insert("Content-Type", "application/json");
    AuthSpec::Bearer {
        token: "secret".to_string(),
    }
    .apply(&mut headers);

    let request = RequestSpec::new(&format!("{}/orders", server.uri()))
        .unwrap()
        .with_method(HttpMethod::Post)
        .with_headers(headers)
        .with_body(r#"{"qty":1}"#);

    let response = transport().send(&request).await.unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn test_cache_token_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("_cb", "token-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestSpec::new(&server.uri())
        .unwrap()
        .with_cache_token("token-1");
    let response = transport().send(&request).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_timeout_is_reported_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let request = RequestSpec::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(100));
    let failure = transport().send(&request).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(failure.timing.total >= 0.1);
    assert_eq!(failure.timing.first_byte, 0.0);
}

#[tokio::test]
async fn test_refused_connection_is_reported_as_failure() {
    // Bind then drop a listener to get a port nothing is listening on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let request = RequestSpec::new(&format!("http://127.0.0.1:{}/", port)).unwrap();
    let failure = transport().send(&request).await.unwrap_err();

    assert_eq!(failure.kind, FailureKind::Connect);
    assert!(!failure.message.is_empty());
}
