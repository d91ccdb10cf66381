//! End-to-end tests of the relay over the Ollama HTTP transport.

use std::sync::Arc;

use chat_relay::prelude::*;
use chat_relay::vendors::ollama::{OllamaClientConfig, OllamaTransport};
use chat_relay::CONNECTION_UNAVAILABLE_MESSAGE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NDJSON: &str = concat!(
    r#"{"model":"llama3.2","created_at":"2024-08-01T10:00:00Z","message":{"role":"assistant","content":"Hel"},"done":false}"#,
    "\n",
    r#"{"model":"llama3.2","created_at":"2024-08-01T10:00:00Z","message":{"role":"assistant","content":"lo"},"done":false}"#,
    "\n",
    r#"{"model":"llama3.2","created_at":"2024-08-01T10:00:01Z","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","total_duration":5000000000,"load_duration":1000000000,"prompt_eval_count":20,"prompt_eval_duration":500000000,"eval_count":2,"eval_duration":1000000000}"#,
    "\n",
);

fn relay_for(base_url: &str) -> StreamRelay {
    let config = OllamaClientConfig::new("llama3.2").base_url(base_url);
    let transport = OllamaTransport::new(config).expect("valid config");
    StreamRelay::new(Arc::new(transport))
}

#[tokio::test]
async fn streams_reply_from_chat_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama3.2",
            "stream": true,
            "messages": [{ "role": "user", "content": "Say hello" }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(NDJSON, "application/x-ndjson"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut session = ChatSession::new(relay_for(&mock_server.uri()));
    let mut chunks = Vec::new();
    let mut errors = Vec::new();
    let mut completes = 0;
    let mut observer = RelayCallbacks::new(
        |text: &str| chunks.push(text.to_string()),
        |message: &str| errors.push(message.to_string()),
        || completes += 1,
    );
    let outcome = session
        .begin_turn("Say hello")
        .expect("turn")
        .complete_with(&mut observer)
        .await;
    drop(observer);

    let RelayOutcome::Completed(stats) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(stats.eval_count, 2);
    assert_eq!(stats.prompt_eval_count, 20);
    assert_eq!(chunks, vec!["Hel", "lo"]);
    assert!(errors.is_empty());
    assert_eq!(completes, 1);
    assert_eq!(session.conversation().messages()[1].content, "Hello");
    assert!(session.status().can_submit());
}

#[tokio::test]
async fn server_error_status_reports_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": "model \"nope\" not found, try pulling it first"
        })))
        .mount(&mock_server)
        .await;

    let run = relay_for(&mock_server.uri())
        .start(&[Message::user("hi")])
        .expect("start");
    let err = run.collect_text().await.expect_err("should fail");

    match err {
        RelayError::TransportError {
            message,
            status_code,
        } => {
            assert_eq!(status_code, Some(404));
            assert!(message.contains("not found"), "{message}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_server_reports_fixed_message() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut session = ChatSession::new(relay_for(&format!("http://{addr}")));
    let outcome = session.begin_turn("hi").expect("turn").complete().await;

    assert!(matches!(
        outcome,
        RelayOutcome::Failed(RelayError::ConnectionUnavailable { .. })
    ));
    assert_eq!(
        session.status().error.as_deref(),
        Some(CONNECTION_UNAVAILABLE_MESSAGE)
    );
    assert_eq!(session.conversation().messages()[1].content, "");
}

/// Whether `raw` holds the request head plus a `content-length` body.
fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..head_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}

#[tokio::test]
async fn connection_closed_mid_stream_reports_truncation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0_u8; 1024];
        while !request_complete(&request) {
            let n = socket.read(&mut buf).await.expect("read");
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let data = "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n{\"done\":fa";
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
            data.len(),
            data
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write");
        socket.flush().await.expect("flush");
        // Close without the terminating zero-length chunk.
    });

    let mut session = ChatSession::new(relay_for(&format!("http://{addr}")));
    let outcome = session.begin_turn("hi").expect("turn").complete().await;
    server.await.expect("server task");

    assert!(
        matches!(outcome, RelayOutcome::Failed(RelayError::Truncated { .. })),
        "got {outcome:?}"
    );
    assert_eq!(session.conversation().messages()[1].content, "Hel");
    assert!(session.status().error.is_some());
}
