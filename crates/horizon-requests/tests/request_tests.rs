//! Integration tests for lazy, execute-once requests.

use std::sync::Arc;
use std::time::Duration;

use horizon_requests::{MultipartForm, RequestBuilder, RequestError, RequestFactory, with_timeout};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

#[tokio::test]
async fn test_builder_does_not_send() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/get", mock_server.uri()))
        .header("a", "1")
        .query("b", "2")
        .build();

    assert!(!request.has_executed().await);
}

#[tokio::test]
async fn test_text_then_status_sends_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello, World!"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/get", mock_server.uri())).build();

    assert_eq!(request.text().await.expect("text"), "Hello, World!");
    assert_eq!(request.status().await.expect("status"), 200);
    assert_eq!(request.text().await.expect("text again"), "Hello, World!");
    assert_eq!(
        request.bytes().await.expect("bytes").as_ref(),
        b"Hello, World!"
    );
    assert!(request.has_executed().await);
}

#[tokio::test]
async fn test_status_then_body_sends_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-request-id", "abc")
                .set_body_json(serde_json::json!({"id": 1, "name": "John"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/data", mock_server.uri())).build();

    assert_eq!(request.status().await.expect("status"), 201);
    let headers = request.headers().await.expect("headers");
    assert_eq!(headers.get("x-request-id").unwrap(), "abc");

    let data: serde_json::Value = request.json().await.expect("json");
    assert_eq!(data["id"], 1);
    assert_eq!(data["name"], "John");
}

#[tokio::test]
async fn test_concurrent_accessors_send_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("done")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Arc::new(RequestBuilder::get(format!("{}/slow", mock_server.uri())).build());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let request = request.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                request.status().await.map(|s| s.to_string())
            } else {
                request.text().await
            }
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let value = task.await.expect("join").expect("request");
        if i % 2 == 0 {
            assert_eq!(value, "200");
        } else {
            assert_eq!(value, "done");
        }
    }
}

#[tokio::test]
async fn test_preset_error_never_sends() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/ip", mock_server.uri()))
        .preset_error(RequestError::msg("must fail"))
        .build();

    assert_eq!(request.text().await.unwrap_err().to_string(), "must fail");
    assert_eq!(request.status().await.unwrap_err().to_string(), "must fail");
    assert_eq!(request.headers().await.unwrap_err().to_string(), "must fail");
    let err = request.json::<serde_json::Value>().await.unwrap_err();
    assert_eq!(err.to_string(), "must fail");
}

#[tokio::test]
async fn test_factory_check_error_never_sends() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let factory = RequestFactory::new([with_timeout(Duration::from_secs(10))])
        .check(|_| Err(RequestError::msg("must fail")));

    let err = factory
        .get(format!("{}/ip", mock_server.uri()))
        .build()
        .text()
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "must fail");
}

#[tokio::test]
async fn test_query_parameters_merge_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/get"))
        .and(query_param("b", "3"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/get", mock_server.uri()))
        .query("a", "1")
        .queries([("a", "2"), ("b", "3")])
        .build();

    assert_eq!(
        request.resolved_url(),
        format!("{}/get?a=1&a=2&b=3", mock_server.uri())
    );
    assert_eq!(request.status().await.expect("status"), 200);

    let received = mock_server.received_requests().await.expect("recording");
    let a: Vec<_> = received[0]
        .url
        .query_pairs()
        .filter(|(k, _)| k == "a")
        .map(|(_, v)| v.into_owned())
        .collect();
    assert_eq!(a, vec!["1", "2"]);
}

#[tokio::test]
async fn test_headers_accumulate_per_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/headers"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/headers", mock_server.uri()))
        .header("a", "1")
        .headers([("a", "2"), ("b", "3")])
        .build();
    request.status().await.expect("status");

    let received = mock_server.received_requests().await.expect("recording");
    let headers = &received[0].headers;
    let a: Vec<_> = headers
        .get_all("a")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(a, vec!["1", "2"]);
    assert_eq!(headers.get("a").unwrap(), "1");
    assert_eq!(headers.get("b").unwrap(), "3");
}

#[tokio::test]
async fn test_error_status_is_not_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status/403"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/status/403", mock_server.uri())).build();
    assert_eq!(request.status().await.expect("status"), 403);
}

#[tokio::test]
async fn test_timeout_is_a_memoized_send_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/delay"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/delay", mock_server.uri()))
        .timeout(Duration::from_millis(100))
        .build();

    let err = request.text().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("deadline exceeded"), "{err}");
    assert!(err.to_string().contains("send request failed"), "{err}");

    let again = request.status().await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
}

#[tokio::test]
async fn test_connection_refused_is_a_send_error() {
    let request = RequestBuilder::get(format!("http://127.0.0.1:{}/", unused_port()))
        .timeout(Duration::from_secs(5))
        .build();

    let err = request.text().await.unwrap_err();
    assert!(matches!(err, RequestError::Send { timed_out: false, .. }));
    assert!(request.has_executed().await);
}

#[tokio::test]
async fn test_redirects_follow_by_default() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/from"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/to", mock_server.uri())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/to"))
        .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/from", mock_server.uri())).build();
    assert_eq!(request.status().await.expect("status"), 200);
    assert_eq!(request.text().await.expect("text"), "landed");
}

#[tokio::test]
async fn test_no_redirect_returns_redirect_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/from"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/to", mock_server.uri())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/to"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/from", mock_server.uri()))
        .no_redirect(true)
        .build();

    assert_eq!(request.status().await.expect("status"), 302);
    let headers = request.headers().await.expect("headers");
    assert_eq!(
        headers.get("location").unwrap().to_str().unwrap(),
        format!("{}/to", mock_server.uri())
    );
}

#[tokio::test]
async fn test_post_file_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::post(format!("{}/post", mock_server.uri()))
        .file("1.txt", "hi", "file", [("field1", "val1"), ("field2", "val2")])
        .timeout(Duration::from_secs(3))
        .build();
    request.status().await.expect("status");

    let received = mock_server.received_requests().await.expect("recording");
    let content_type = received[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"));

    let body = String::from_utf8_lossy(&received[0].body);
    assert!(body.contains("filename=\"1.txt\""));
    assert!(body.contains("name=\"field1\""));
    assert!(body.contains("val2"));
}

#[tokio::test]
async fn test_json_decode_error_is_not_memoized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::get(format!("{}/text", mock_server.uri())).build();

    let err = request.json::<serde_json::Value>().await.unwrap_err();
    assert!(matches!(err, RequestError::Decode { .. }));
    assert_eq!(request.text().await.expect("text"), "not json");
}

#[tokio::test]
async fn test_abandoned_accessor_does_not_resend() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestBuilder::post(format!("{}/slow", mock_server.uri()))
        .text("payload")
        .build();

    let abandoned = tokio::time::timeout(Duration::from_millis(50), request.text()).await;
    assert!(abandoned.is_err());
    assert!(request.has_executed().await);

    let err = request.status().await.unwrap_err();
    assert!(err.is_cancelled(), "{err}");
    let again = request.text().await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());

    let received = mock_server.received_requests().await.expect("recording");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, b"payload");
}

#[tokio::test]
async fn test_typed_file_part_carries_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let form = MultipartForm::new()
        .text("kind", "report")
        .typed_file("file", "report.csv", "a,b\n1,2\n", "text/csv")
        .expect("valid content type");
    let request = RequestBuilder::post(format!("{}/upload", mock_server.uri()))
        .multipart(form)
        .build();
    request.status().await.expect("status");

    let received = mock_server.received_requests().await.expect("recording");
    let body = String::from_utf8_lossy(&received[0].body).to_ascii_lowercase();
    assert!(body.contains("filename=\"report.csv\""), "{body}");
    assert!(body.contains("content-type: text/csv"), "{body}");
    assert!(body.contains("a,b\n1,2"), "{body}");
}
