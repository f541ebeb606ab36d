//! End-to-end tests: `ChatSession` over `HttpBackend` against a local
//! NDJSON server.
//!
//! The server is a bare tokio `TcpListener` that reads one HTTP request and
//! answers with a close-delimited body, written in the chunks the test asks
//! for so frames can be split at awkward byte offsets.

use std::sync::Arc;
use std::time::Duration;

use knowbot_core::{
    AppConfig, ChatSession, ConversationPhase, HttpBackend, Interaction, Metadata, Source,
    StreamError, StreamEvent,
};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Canned reply for one request
struct Reply {
    status: &'static str,
    chunks: Vec<Vec<u8>>,
    /// Pause after each chunk
    gap: Duration,
}

impl Reply {
    fn ok(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            status: "200 OK",
            chunks,
            gap: Duration::from_millis(5),
        }
    }

    fn paced(chunks: Vec<Vec<u8>>, gap: Duration) -> Self {
        Self {
            gap,
            ..Self::ok(chunks)
        }
    }
}

/// Serve one request per reply, in order; returns the endpoint URL and the
/// request bodies as they arrive
async fn serve(replies: Vec<Reply>) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (body_tx, body_rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let body = read_request(&mut socket).await;
            let _ = body_tx.send(body);

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
                reply.status
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for chunk in reply.chunks {
                // The client may hang up early (read timeout)
                if socket.write_all(&chunk).await.is_err() || socket.flush().await.is_err() {
                    break;
                }
                tokio::time::sleep(reply.gap).await;
            }
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{addr}/api/chat"), body_rx)
}

/// Read headers plus a Content-Length body
async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_lowercase();
    let content_length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse().unwrap())
        .unwrap_or(0);

    while data.len() < header_end + content_length {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    String::from_utf8(data[header_end..].to_vec()).unwrap()
}

fn session_for(endpoint: String) -> ChatSession<HttpBackend> {
    session_with_read_timeout(endpoint, Duration::from_secs(5))
}

fn session_with_read_timeout(endpoint: String, read_timeout: Duration) -> ChatSession<HttpBackend> {
    let mut config = AppConfig::default();
    config.service.endpoint = endpoint;
    config.service.connect_timeout = Duration::from_secs(2);
    config.service.read_timeout = read_timeout;

    let backend = HttpBackend::from_config(&config.service).unwrap();
    ChatSession::new(Arc::new(backend), Arc::new(config))
}

async fn drain(session: &mut ChatSession<HttpBackend>) -> Vec<StreamEvent> {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut events = Vec::new();
        while session.is_streaming() {
            events.extend(session.next_events().await);
        }
        events
    })
    .await
    .expect("stream did not finish")
}

#[tokio::test]
async fn test_install_question_committed_with_sources() {
    let (endpoint, mut bodies) = serve(vec![Reply::ok(vec![
        b"{\"delta\":\"Sure\"}\n".to_vec(),
        b"{\"delta\":\", run\"}\n{\"del".to_vec(),
        b"ta\":\" `npm install`\"}\n".to_vec(),
        b"{\"sources\":[{\"title\":\"README\"}]}\n".to_vec(),
    ])])
    .await;
    let mut session = session_for(endpoint);

    assert!(session.submit("How do I install it?").is_accepted());
    let events = drain(&mut session).await;

    let deltas: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Delta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Sure", ", run", " `npm install`"]);
    assert_eq!(
        session.history(),
        &[Interaction {
            input: "How do I install it?".to_string(),
            output: "Sure, run `npm install`".to_string(),
            metadata: Metadata::with_sources(vec![Source::titled("README")]),
        }]
    );
    assert_eq!(session.conversation().input, "");

    let request: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
    assert_eq!(request["query"], "How do I install it?");
    assert_eq!(request["history"], serde_json::json!([]));
    assert_eq!(request["config"]["completionModel"], "gpt-3.5-turbo");
    assert_eq!(request["config"]["namespace"], "my-namespace");
}

#[tokio::test]
async fn test_multibyte_character_split_across_chunks() {
    let frame = "{\"delta\":\"caf\u{e9} \u{2615}\"}\n".as_bytes().to_vec();
    let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
    let (endpoint, _bodies) = serve(vec![Reply::ok(vec![
        frame[..split].to_vec(),
        frame[split..].to_vec(),
        b"{\"sources\":[]}".to_vec(),
    ])])
    .await;
    let mut session = session_for(endpoint);

    session.submit("coffee?");
    drain(&mut session).await;

    assert_eq!(session.history()[0].output, "caf\u{e9} \u{2615}");
}

#[tokio::test]
async fn test_second_request_carries_history() {
    let (endpoint, mut bodies) = serve(vec![
        Reply::ok(vec![b"{\"delta\":\"one\"}\n{\"sources\":[]}\n".to_vec()]),
        Reply::ok(vec![b"{\"delta\":\"two\"}\n{\"sources\":[]}\n".to_vec()]),
    ])
    .await;
    let mut session = session_for(endpoint);

    session.submit("first");
    drain(&mut session).await;
    session.submit("second");
    drain(&mut session).await;

    bodies.recv().await.unwrap();
    let second: serde_json::Value = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
    assert_eq!(
        second["history"],
        serde_json::json!([{ "input": "first", "output": "one" }])
    );
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_server_error_status_fails_stream() {
    let (endpoint, _bodies) = serve(vec![Reply {
        status: "500 Internal Server Error",
        ..Reply::ok(vec![b"index unavailable".to_vec()])
    }])
    .await;
    let mut session = session_for(endpoint);

    session.submit("q");
    let events = drain(&mut session).await;

    assert_eq!(
        events,
        vec![StreamEvent::Failed {
            error: StreamError::Status {
                status: 500,
                body: "index unavailable".to_string(),
            },
            partial: String::new(),
        }]
    );
    assert!(session.history().is_empty());
    assert_eq!(session.phase(), ConversationPhase::PendingQuery);
}

#[tokio::test]
async fn test_body_closed_before_sources_is_not_committed() {
    let (endpoint, _bodies) = serve(vec![Reply::ok(vec![b"{\"delta\":\"half\"}\n".to_vec()])]).await;
    let mut session = session_for(endpoint);

    session.submit("q");
    let events = drain(&mut session).await;

    assert_eq!(
        events.last(),
        Some(&StreamEvent::Failed {
            error: StreamError::Truncated,
            partial: "half".to_string(),
        })
    );
    assert!(session.history().is_empty());
    assert_eq!(session.conversation().input, "q");
}

#[tokio::test]
async fn test_malformed_line_skipped() {
    let (endpoint, _bodies) = serve(vec![Reply::ok(vec![
        b"{\"delta\":\"a\"}\nnot json\n{\"unexpected\":1}\n\n{\"delta\":\"b\"}\n{\"sources\":[]}\n".to_vec(),
    ])])
    .await;
    let mut session = session_for(endpoint);

    session.submit("q");
    drain(&mut session).await;

    assert_eq!(session.history()[0].output, "ab");
    assert_eq!(session.stream_stats().malformed_frames, 2);
}

#[tokio::test]
async fn test_connection_refused_fails_stream() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut session = session_for(format!("http://{addr}/api/chat"));
    session.submit("q");
    let events = drain(&mut session).await;

    match events.as_slice() {
        [StreamEvent::Failed { error, partial }] => {
            assert!(error.is_connection_failure(), "unexpected error: {error}");
            assert!(partial.is_empty());
        }
        other => panic!("expected one Failed event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_answer_may_stream_longer_than_read_timeout() {
    let mut chunks: Vec<Vec<u8>> = (0..6)
        .map(|i| format!("{{\"delta\":\"{i}\"}}\n").into_bytes())
        .collect();
    chunks.push(b"{\"sources\":[]}\n".to_vec());
    let (endpoint, _bodies) = serve(vec![Reply::paced(chunks, Duration::from_millis(150))]).await;
    let mut session = session_with_read_timeout(endpoint, Duration::from_millis(400));

    session.submit("count slowly");
    drain(&mut session).await;

    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history()[0].output, "012345");
}

#[tokio::test]
async fn test_stalled_body_fails_after_read_timeout() {
    let (endpoint, _bodies) = serve(vec![Reply::paced(
        vec![
            b"{\"delta\":\"slow\"}\n".to_vec(),
            b"{\"sources\":[]}\n".to_vec(),
        ],
        Duration::from_secs(2),
    )])
    .await;
    let mut session = session_with_read_timeout(endpoint, Duration::from_millis(200));

    session.submit("q");
    let events = drain(&mut session).await;

    assert!(
        matches!(events.last(), Some(StreamEvent::Failed { partial, .. }) if partial == "slow"),
        "unexpected events: {events:?}"
    );
    assert!(session.history().is_empty());
    assert_eq!(session.phase(), ConversationPhase::PendingQuery);
}
