use agent_relay::error::QueryError;
use agent_relay::ipc::MemoryNotifier;
use agent_relay::query::{AbortHandle, AgentQuery, EventStream, QueryOptions, QueryRequest};
use agent_relay::server::{self, Relay};
use agent_relay::{Notification, StreamEvent};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};

/// Echoes every prompt back as one assistant text block, tagged with a
/// per-query tool call so correlation state can be checked per session.
#[derive(Default)]
struct EchoAgent {
    prompts: Mutex<Vec<String>>,
}

impl AgentQuery for EchoAgent {
    fn start(&self, request: QueryRequest) -> Result<EventStream, QueryError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let events = [
            json!({"type": "assistant", "message": {"content": [
                {"type": "text", "text": format!("echo: {}", request.prompt)},
                {"type": "tool_use", "id": "shared-id", "name": "Bash", "input": {"command": "true"}}
            ]}}),
            json!({"type": "user", "message": {"content": [
                {"type": "tool_result", "tool_use_id": "shared-id", "content": "ok"}
            ]}}),
        ];
        let items = events
            .into_iter()
            .map(|value| Ok(serde_json::from_value::<StreamEvent>(value).unwrap()))
            .collect();
        Ok(EventStream::from_items(items))
    }
}

async fn wait_for(sink: &MemoryNotifier, count: usize) -> Vec<Notification> {
    timeout(Duration::from_secs(5), async {
        loop {
            let sent = sink.notifications();
            if sent.len() >= count {
                return sent;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for notifications")
}

async fn connect(path: &std::path::Path) -> UnixStream {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(stream) = UnixStream::connect(path).await {
                return stream;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("server did not start")
}

#[tokio::test]
async fn socket_messages_become_queries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relay.sock");
    // Stale socket file from a previous run must not block startup.
    std::fs::write(&path, b"").unwrap();

    let agent = Arc::new(EchoAgent::default());
    let sink = Arc::new(MemoryNotifier::default());
    let relay = Arc::new(Relay::new(
        agent.clone(),
        sink.clone(),
        QueryOptions::default(),
    ));
    let (abort, signal) = AbortHandle::new();
    let server = tokio::spawn({
        let path = path.clone();
        async move { server::start(relay, &path, signal).await }
    });

    let mut conn = connect(&path).await;
    conn.write_all(b"plain text prompt\n\n   \n{\"content\":\"from envelope\"}\n")
        .await
        .unwrap();

    let sent = wait_for(&sink, 6).await;
    assert_eq!(
        *agent.prompts.lock().unwrap(),
        vec!["plain text prompt".to_string(), "from envelope".to_string()]
    );

    // Per message: text, command request, command response.
    assert_eq!(
        sent[0],
        Notification::AgentTextResponse {
            text: "echo: plain text prompt".into(),
            is_error: false
        }
    );
    assert!(matches!(sent[1], Notification::CommandExecutionRequest { .. }));
    assert!(matches!(sent[2], Notification::CommandExecutionResponse(_)));
    assert_eq!(
        sent[3],
        Notification::AgentTextResponse {
            text: "echo: from envelope".into(),
            is_error: false
        }
    );
    assert!(matches!(sent[5], Notification::CommandExecutionResponse(_)));

    abort.abort();
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn invalid_utf8_is_reported_as_handler_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relay.sock");

    let sink = Arc::new(MemoryNotifier::default());
    let relay = Arc::new(Relay::new(
        Arc::new(EchoAgent::default()),
        sink.clone(),
        QueryOptions::default(),
    ));
    let (abort, signal) = AbortHandle::new();
    let server = tokio::spawn({
        let path = path.clone();
        async move { server::start(relay, &path, signal).await }
    });

    let mut conn = connect(&path).await;
    conn.write_all(&[0xff, 0xfe, b'\n']).await.unwrap();

    let sent = wait_for(&sink, 1).await;
    match &sent[0] {
        Notification::AgentTextResponse { text, is_error } => {
            assert!(*is_error);
            assert!(text.starts_with("Error in message handler:"), "{text}");
        }
        other => panic!("expected handler error, got {other:?}"),
    }

    abort.abort();
    let _ = timeout(Duration::from_secs(5), server).await;
}
