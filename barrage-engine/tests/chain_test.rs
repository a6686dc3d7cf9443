use barrage_config::BarrageConfig;
use barrage_engine::{ChainRequest, LoadTestRunner};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chain(value: serde_json::Value) -> ChainRequest {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn test_extracted_token_is_sent_by_next_step() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "abc123"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("Authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let request = chain(json!({
        "steps": [
            {
                "id": "login",
                "name": "Login",
                "url": format!("{}/login", server.uri()),
                "method": "POST",
                "body": "{\"user\": \"{{user}}\"}",
                "extractionRules": [{"variableName": "token", "source": "body", "path": "token"}]
            },
            {
                "id": "me",
                "name": "Profile",
                "url": format!("{}/me", server.uri()),
                "headers": {"Authorization": "Bearer {{token}}"},
                "assertions": [
                    {"type": "json_path", "fieldPath": "name", "operator": "equals", "expectedValue": "ada"}
                ]
            }
        ],
        "globalVariables": {"user": "ada"}
    }));

    let result = LoadTestRunner::new(&BarrageConfig::default())
        .run_chain(&request)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].extracted["token"], json!("abc123"));
    assert_eq!(result.variables["token"], json!("abc123"));
    assert_eq!(result.steps[1].status, 200);
    assert!(result.steps[1].assertions[0].passed);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].body, br#"{"user": "ada"}"#.to_vec());
}

#[tokio::test]
async fn test_error_status_continues_unless_asked_to_stop() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let steps = |stop: Option<bool>| {
        let mut first = json!({
            "name": "missing",
            "url": format!("{}/missing", server.uri()),
            "extractionRules": [{"variableName": "code", "source": "status"}]
        });
        if let Some(stop) = stop {
            first["stopOnError"] = json!(stop);
        }
        chain(json!({
            "steps": [first, {"name": "next", "url": format!("{}/next", server.uri())}]
        }))
    };
    let runner = LoadTestRunner::new(&BarrageConfig::default());

    let result = runner.run_chain(&steps(None)).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, 404);
    // nothing is extracted from a failed step
    assert!(result.steps[0].extracted.is_empty());
    assert!(result.steps[1].success);

    let result = runner.run_chain(&steps(Some(true))).await.unwrap();
    assert_eq!(result.steps.len(), 1);
}

#[tokio::test]
async fn test_transport_failure_stops_chain_by_default() {
    let request = chain(json!({
        "steps": [
            {"name": "down", "url": "http://127.0.0.1:1/", "timeout": 2},
            {"name": "never", "url": "http://127.0.0.1:1/"}
        ]
    }));

    let result = LoadTestRunner::new(&BarrageConfig::default())
        .run_chain(&request)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].status, 0);
    assert!(result.steps[0].error.is_some());
}

#[tokio::test]
async fn test_invalid_substituted_url_is_a_step_error() {
    let request = chain(json!({
        "steps": [{"name": "broken", "url": "{{base}}/items", "stopOnError": false}]
    }));

    let result = LoadTestRunner::new(&BarrageConfig::default())
        .run_chain(&request)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.steps[0].url, "{{base}}/items");
    assert!(result.steps[0].error.is_some());
}

#[tokio::test]
async fn test_missing_extraction_keeps_earlier_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"t": "one"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"other": 1})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/third"))
        .and(query_param("x", "one"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let rule = json!([{"variableName": "t", "source": "body", "path": "t"}]);
    let request = chain(json!({
        "steps": [
            {"name": "first", "url": format!("{}/first", server.uri()), "extractionRules": rule},
            {"name": "second", "url": format!("{}/second", server.uri()), "extractionRules": rule},
            {"name": "third", "url": format!("{}/third?x={{{{t}}}}", server.uri())}
        ]
    }));

    let result = LoadTestRunner::new(&BarrageConfig::default())
        .run_chain(&request)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.variables["t"], json!("one"));
    assert_eq!(result.steps[0].extracted["t"], json!("one"));
    assert!(result.steps[1].extracted.is_empty());
    assert!(result.steps[2].url.contains("x=one"));
    assert_eq!(result.steps[2].status, 200);
}

#[tokio::test]
async fn test_transport_failure_continues_when_stop_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/after"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let request = chain(json!({
        "steps": [
            {"name": "down", "url": "http://127.0.0.1:1/", "timeout": 2, "stopOnError": false},
            {"name": "after", "url": format!("{}/after", server.uri())}
        ]
    }));

    let result = LoadTestRunner::new(&BarrageConfig::default())
        .run_chain(&request)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, 0);
    assert!(result.steps[0].error.is_some());
    assert!(result.steps[1].success);
    assert_eq!(result.steps[1].status, 200);
}
