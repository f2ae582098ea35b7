//! Generate proxy behavior against a scripted fake upstream.

use http_body_util::BodyExt;
use imgen::config::{AppState, Config};
use imgen::handler::generate;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Spawn a fake generateContent endpoint that records every request it
/// receives and answers each with the same canned response.
async fn spawn_upstream(
    status: &'static str,
    body: String,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let request = read_request(&mut stream).await;
                tx.send(request).ok();
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });

    (addr, rx)
}

async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if request_complete(&buf) {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn request_complete(buf: &[u8]) -> bool {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= header_end + 4 + content_length
}

fn test_state(base_url: &str, api_key: Option<&str>) -> AppState {
    let mut cfg = Config::load_from("no-such-config-file").unwrap();
    cfg.upstream.base_url = base_url.to_string();
    cfg.upstream.api_key = api_key.map(ToString::to_string);
    cfg.upstream.request_timeout = 5;
    AppState::new(cfg).unwrap()
}

async fn body_json(response: hyper::Response<http_body_util::Full<hyper::body::Bytes>>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn image_success_body() -> String {
    json!({
        "candidates": [{
            "content": {
                "parts": [
                    { "text": "sure" },
                    { "inlineData": { "mimeType": "image/webp", "data": "QUJDRA==" } }
                ]
            }
        }]
    })
    .to_string()
}

#[tokio::test]
async fn valid_prompt_issues_exactly_one_call_with_prompt_verbatim() {
    let (addr, mut rx) = spawn_upstream("200 OK", image_success_body()).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    let prompt = "画一只可爱的猫 🐱 sitting on a rooftop";
    let body = json!({ "prompt": prompt }).to_string();
    let response = generate::process(&state, body.as_bytes()).await;

    assert_eq!(response.status(), 200);
    let reply = body_json(response).await;
    assert_eq!(reply["imageBase64"], "QUJDRA==");
    assert_eq!(reply["mimeType"], "image/webp");

    let request = rx.recv().await.unwrap();
    assert!(
        request.contains(prompt),
        "prompt should be embedded verbatim"
    );
    assert!(request.starts_with("POST /models/gemini-3-pro-image-preview:generateContent"));
    assert!(request.to_lowercase().contains("x-goog-api-key: test-key"));
    assert!(rx.try_recv().is_err(), "exactly one outbound call expected");
}

#[tokio::test]
async fn requested_model_overrides_the_default() {
    let (addr, mut rx) = spawn_upstream("200 OK", image_success_body()).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    let body = json!({ "prompt": "a red square", "model": "custom-image-model" }).to_string();
    let response = generate::process(&state, body.as_bytes()).await;

    assert_eq!(response.status(), 200);
    let request = rx.recv().await.unwrap();
    assert!(request.starts_with("POST /models/custom-image-model:generateContent"));
}

#[tokio::test]
async fn snake_case_payload_is_accepted() {
    let body = json!({
        "candidates": [{
            "content": {
                "parts": [
                    { "inline_data": { "mime_type": "image/jpeg", "data": "REVG" } }
                ]
            }
        }]
    })
    .to_string();
    let (addr, _rx) = spawn_upstream("200 OK", body).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    let response = generate::process(
        &state,
        json!({ "prompt": "a cat" }).to_string().as_bytes(),
    )
    .await;

    assert_eq!(response.status(), 200);
    let reply = body_json(response).await;
    assert_eq!(reply["imageBase64"], "REVG");
    assert_eq!(reply["mimeType"], "image/jpeg");
}

#[tokio::test]
async fn missing_mime_type_defaults_to_png() {
    let body = json!({
        "candidates": [{
            "content": { "parts": [{ "inlineData": { "data": "QUJD" } }] }
        }]
    })
    .to_string();
    let (addr, _rx) = spawn_upstream("200 OK", body).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    let response = generate::process(
        &state,
        json!({ "prompt": "a dog" }).to_string().as_bytes(),
    )
    .await;

    assert_eq!(response.status(), 200);
    let reply = body_json(response).await;
    assert_eq!(reply["mimeType"], "image/png");
}

#[tokio::test]
async fn text_only_upstream_answer_is_informational_not_an_error() {
    let upstream_body = json!({
        "candidates": [{
            "content": { "parts": [{ "text": "I cannot draw that" }] }
        }]
    })
    .to_string();
    let (addr, _rx) = spawn_upstream("200 OK", upstream_body).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    let response = generate::process(
        &state,
        json!({ "prompt": "something" }).to_string().as_bytes(),
    )
    .await;

    assert_eq!(response.status(), 200);
    let reply = body_json(response).await;
    assert_eq!(reply["message"], "no image returned");
    assert!(reply["raw"]["candidates"].is_array());
    assert!(reply.get("error").is_none());
}

#[tokio::test]
async fn upstream_rejection_relays_status_and_body() {
    let upstream_body = json!({ "error": { "message": "model overloaded" } }).to_string();
    let (addr, _rx) = spawn_upstream("503 Service Unavailable", upstream_body).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    let response = generate::process(
        &state,
        json!({ "prompt": "anything" }).to_string().as_bytes(),
    )
    .await;

    assert_eq!(response.status(), 503);
    let reply = body_json(response).await;
    assert_eq!(reply["error"], "generation failed");
    assert!(reply["detail"]
        .as_str()
        .unwrap()
        .contains("model overloaded"));
}

#[tokio::test]
async fn unreachable_upstream_maps_to_502() {
    // Bind then drop to find a port nothing is listening on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let state = test_state(&format!("http://{addr}"), Some("test-key"));
    let response = generate::process(
        &state,
        json!({ "prompt": "anything" }).to_string().as_bytes(),
    )
    .await;

    assert_eq!(response.status(), 502);
    let reply = body_json(response).await;
    assert_eq!(reply["error"], "upstream unreachable");
}

#[tokio::test]
async fn blank_prompt_is_rejected_without_an_outbound_call() {
    let (addr, mut rx) = spawn_upstream("200 OK", image_success_body()).await;
    let state = test_state(&format!("http://{addr}"), Some("test-key"));

    for body in [
        json!({ "prompt": "" }).to_string(),
        json!({ "prompt": "   \n\t " }).to_string(),
        json!({ "model": "x" }).to_string(),
    ] {
        let response = generate::process(&state, body.as_bytes()).await;
        assert_eq!(response.status(), 400);
        let reply = body_json(response).await;
        assert_eq!(reply["error"], "missing prompt");
    }

    assert!(rx.try_recv().is_err(), "no outbound call expected");
}

#[tokio::test]
async fn missing_api_key_is_rejected_without_an_outbound_call() {
    let (addr, mut rx) = spawn_upstream("200 OK", image_success_body()).await;
    let state = test_state(&format!("http://{addr}"), None);

    let response = generate::process(
        &state,
        json!({ "prompt": "a perfectly valid prompt" })
            .to_string()
            .as_bytes(),
    )
    .await;

    assert_eq!(response.status(), 500);
    let reply = body_json(response).await;
    assert_eq!(reply["error"], "service not configured");
    assert!(rx.try_recv().is_err(), "no outbound call expected");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let state = test_state("http://127.0.0.1:9", Some("test-key"));

    for body in [
        b"not json".as_slice(),
        b"".as_slice(),
        br#"{"prompt": 42}"#.as_slice(),
    ] {
        let response = generate::process(&state, body).await;
        assert_eq!(response.status(), 400);
        let reply = body_json(response).await;
        assert_eq!(reply["error"], "invalid request body");
    }
}

#[tokio::test]
async fn oversized_chunked_body_is_rejected_with_413() {
    let mut cfg = Config::load_from("no-such-config-file").unwrap();
    cfg.upstream.api_key = Some("test-key".to_string());
    cfg.http.max_body_size = 1024;
    cfg.logging.access_log = false;

    let listener = imgen::server::create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(cfg).unwrap());
    tokio::spawn(async move {
        let _ = imgen::server::run(listener, state).await;
    });

    // Chunked transfer carries no Content-Length, so the cap must hold
    // while the body streams in
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"POST /api/generate HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let chunk = [b'a'; 512];
    for _ in 0..3 {
        stream.write_all(b"200\r\n").await.unwrap();
        stream.write_all(&chunk).await.unwrap();
        stream.write_all(b"\r\n").await.unwrap();
    }

    // The limit trips mid-body, so the response arrives before the
    // terminating chunk is sent
    let mut response = [0u8; 4096];
    let n = stream.read(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response[..n]);
    assert!(
        response.starts_with("HTTP/1.1 413"),
        "expected 413, got: {response}"
    );
}

#[tokio::test]
async fn generate_route_works_end_to_end() {
    let (upstream_addr, _rx) = spawn_upstream("200 OK", image_success_body()).await;

    let mut cfg = Config::load_from("no-such-config-file").unwrap();
    cfg.upstream.base_url = format!("http://{upstream_addr}");
    cfg.upstream.api_key = Some("test-key".to_string());
    cfg.upstream.request_timeout = 5;
    cfg.logging.access_log = false;

    let listener = imgen::server::create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(AppState::new(cfg).unwrap());
    tokio::spawn(async move {
        let _ = imgen::server::run(listener, state).await;
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/generate"))
        .json(&json!({ "prompt": "a lighthouse at dusk" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["imageBase64"], "QUJDRA==");
    assert_eq!(reply["mimeType"], "image/webp");
}
