//! Transport tests against a loopback HTTP/1.1 server, exercising the real
//! `reqwest` executor end to end.

use lrepl_llm::http::{Headers, HttpClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

enum Reply {
    /// Complete response with a Content-Length
    Full { status: u16, body: String },
    /// Close-delimited body written piece by piece; waits on `gate` before
    /// every piece after the first
    Pieces { parts: Vec<String>, gate: Arc<Notify> },
    /// Send the stream head and one piece, then go quiet
    Stalled { first: String },
    /// Accept the connection and never answer
    Silent,
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Read one request (head plus Content-Length body) and return it as text.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);

        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&data).to_string()
}

/// Serve `replies` on consecutive connections; the handle yields the requests seen.
async fn spawn_server(replies: Vec<Reply>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for reply in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);

            match reply {
                Reply::Full { status, body } => {
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason(status),
                        body.len(),
                        body
                    );
                    socket.write_all(response.as_bytes()).await.unwrap();
                }
                Reply::Pieces { parts, gate } => {
                    socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n")
                        .await
                        .unwrap();
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            gate.notified().await;
                        }
                        socket.write_all(part.as_bytes()).await.unwrap();
                        socket.flush().await.unwrap();
                    }
                }
                Reply::Stalled { first } => {
                    socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n")
                        .await
                        .unwrap();
                    socket.write_all(first.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Reply::Silent => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
            let _ = socket.shutdown().await;
        }
        requests
    });

    (base_url, handle)
}

fn fast_client(base_url: &str) -> HttpClient {
    let mut client = HttpClient::new(base_url, Duration::from_secs(5));
    client.set_retry_delay(Duration::from_millis(5));
    client
}

fn sse(content: &str) -> String {
    format!("data: {}\n\n", json!({"choices": [{"delta": {"content": content}}]}))
}

#[tokio::test]
async fn test_post_json_round_trip() {
    let (base_url, server) = spawn_server(vec![Reply::Full {
        status: 200,
        body: r#"{"choices":[{"message":{"content":"hi"}}]}"#.to_string(),
    }])
    .await;

    let mut client = fast_client(&base_url);
    client.set_bearer_token("test-token");
    let response = client
        .post("/chat/completions", &json!({"model": "m"}), &Headers::new())
        .await;

    assert!(response.success);
    assert_eq!(response.status_code, 200);
    assert!(response.body.contains("\"hi\""));
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );

    let requests = server.await.unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("post /chat/completions http/1.1"));
    assert!(request.contains("authorization: bearer test-token"));
    assert!(request.contains("content-type: application/json"));
    assert!(request.ends_with(r#"{"model":"m"}"#));
}

#[tokio::test]
async fn test_server_errors_are_retried_then_returned() {
    let replies = (0..4)
        .map(|_| Reply::Full {
            status: 500,
            body: "internal".to_string(),
        })
        .collect();
    let (base_url, server) = spawn_server(replies).await;

    let response = fast_client(&base_url).get("/models", &Headers::new()).await;

    assert!(!response.success);
    assert_eq!(response.status_code, 500);
    assert_eq!(response.error_message, "HTTP 500: internal");
    assert_eq!(server.await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let (base_url, server) = spawn_server(vec![
        Reply::Full {
            status: 429,
            body: "slow down".to_string(),
        },
        Reply::Full {
            status: 200,
            body: "{}".to_string(),
        },
    ])
    .await;

    let response = fast_client(&base_url).post("/x", &json!({}), &Headers::new()).await;
    assert!(response.success);
    assert_eq!(server.await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let (base_url, server) = spawn_server(vec![Reply::Full {
        status: 404,
        body: "no such route".to_string(),
    }])
    .await;

    let response = fast_client(&base_url).get("/missing", &Headers::new()).await;
    assert_eq!(response.status_code, 404);
    assert_eq!(server.await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut client = fast_client(&base_url);
    client.set_retry_count(1);
    let response = client.post("/x", &json!({}), &Headers::new()).await;

    assert!(!response.success);
    assert_eq!(response.status_code, 0);
    assert!(response.error_message.starts_with("Connection failed:"));
}

#[tokio::test]
async fn test_timeout_is_a_connection_failure() {
    let (base_url, _server) = spawn_server(vec![Reply::Silent]).await;

    let mut client = fast_client(&base_url);
    client.set_retry_count(0);
    client.set_timeout(Duration::from_millis(200));
    let response = client.get("/slow", &Headers::new()).await;

    assert_eq!(response.status_code, 0);
    assert!(
        response.error_message.starts_with("Connection failed: timed out"),
        "{}",
        response.error_message
    );
}

#[tokio::test]
async fn test_stream_is_delivered_incrementally() {
    let gate = Arc::new(Notify::new());
    let (base_url, server) = spawn_server(vec![Reply::Pieces {
        parts: vec![sse("first"), sse(" second"), "data: [DONE]\n\n".to_string()],
        gate: gate.clone(),
    }])
    .await;

    // The server only sends the next piece after the previous one reached
    // the callback, so a buffering transport would stall here.
    let client = fast_client(&base_url);
    let mut chunks = Vec::new();
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        client.post_stream("/chat/completions", &json!({"stream": true}), &Headers::new(), |chunk, done| {
            chunks.push((chunk.to_string(), done));
            gate.notify_one();
        }),
    )
    .await
    .expect("stream stalled");

    assert!(response.success);
    assert_eq!(
        chunks,
        vec![
            ("first".to_string(), false),
            (" second".to_string(), false),
            (String::new(), true),
        ]
    );

    let request = server.await.unwrap().remove(0).to_lowercase();
    assert!(request.contains("accept: text/event-stream"));
}

#[tokio::test]
async fn test_stream_error_status() {
    let (base_url, _server) = spawn_server(vec![Reply::Full {
        status: 429,
        body: r#"{"error":"rate limited"}"#.to_string(),
    }])
    .await;

    let mut calls = 0;
    let response = fast_client(&base_url)
        .post_stream("/chat/completions", &json!({}), &Headers::new(), |_, _| calls += 1)
        .await;

    assert_eq!(calls, 0);
    assert_eq!(response.status_code, 429);
    assert!(response.error_message.contains("rate limited"));
}

#[tokio::test]
async fn test_stalled_stream_is_interrupted() {
    let (base_url, _server) = spawn_server(vec![Reply::Stalled { first: sse("only") }]).await;

    let mut client = fast_client(&base_url);
    client.set_timeout(Duration::from_millis(500));

    let mut chunks = Vec::new();
    let response = tokio::time::timeout(
        Duration::from_secs(4),
        client.post_stream("/chat/completions", &json!({"stream": true}), &Headers::new(), |chunk, done| {
            chunks.push((chunk.to_string(), done));
        }),
    )
    .await
    .expect("stalled stream was not timed out");

    assert!(!response.success);
    assert!(
        response.error_message.starts_with("Stream interrupted: timed out"),
        "{}",
        response.error_message
    );
    assert_eq!(chunks, vec![("only".to_string(), false), (String::new(), true)]);
}

#[tokio::test]
async fn test_stream_without_response_head_times_out() {
    let (base_url, _server) = spawn_server(vec![Reply::Silent]).await;

    let mut client = fast_client(&base_url);
    client.set_timeout(Duration::from_millis(300));

    let mut calls = 0;
    let response = tokio::time::timeout(
        Duration::from_secs(4),
        client.post_stream("/chat/completions", &json!({}), &Headers::new(), |_, _| calls += 1),
    )
    .await
    .expect("silent server was not timed out");

    assert_eq!(calls, 0);
    assert_eq!(response.status_code, 0);
    assert!(
        response.error_message.starts_with("Connection failed: timed out"),
        "{}",
        response.error_message
    );
}
