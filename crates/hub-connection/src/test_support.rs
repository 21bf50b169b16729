//! Mock hub servers and helpers shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::events::{EventBus, EventKind, HubEvent, Subscription};
use crate::state::{HubContext, HubState};
use crate::types::{FhircastConfig, HubConfig};

/// A request captured by [`MockHttp`].
#[derive(Debug, Clone)]
pub(crate) struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl CapturedRequest {
    /// Decodes a form-encoded body.
    pub fn form(&self) -> HashMap<String, String> {
        reqwest::Url::parse(&format!("http://x/?{}", self.body))
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Mock HTTP server answering with queued `(status, body)` pairs; the last
/// pair repeats once the queue runs dry.
pub(crate) struct MockHttp {
    pub url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockHttp {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for MockHttp {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts a mock HTTP server.
pub(crate) async fn mock_http(responses: Vec<(u16, String)>) -> MockHttp {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let url = format!("http://127.0.0.1:{port}");
    let requests = Arc::new(Mutex::new(Vec::new()));

    let captured = requests.clone();
    let handle = tokio::spawn(async move {
        let mut served = 0usize;
        while let Ok((mut stream, _)) = listener.accept().await {
            let Some(request) = read_request(&mut stream).await else {
                continue;
            };
            captured.lock().unwrap().push(request);

            let (status, body) = responses
                .get(served)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or((200, String::new()));
            served += 1;

            let resp = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    MockHttp {
        url,
        requests,
        handle,
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    Some(CapturedRequest {
        method,
        path,
        headers,
        body,
    })
}

#[derive(Debug, Clone)]
enum WsCommand {
    Text(String),
    Close,
}

/// Mock hub websocket endpoint.
pub(crate) struct MockWs {
    pub url: String,
    received: mpsc::UnboundedReceiver<String>,
    commands: broadcast::Sender<WsCommand>,
    connections: Arc<AtomicUsize>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockWs {
    /// Next text frame received from the client, if one arrives within 2 s.
    pub async fn next_received(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Sends a text frame to every connected client.
    pub fn send_text(&self, text: &str) {
        let _ = self.commands.send(WsCommand::Text(text.to_string()));
    }

    /// Closes every connected client.
    pub fn close_all(&self) {
        let _ = self.commands.send(WsCommand::Close);
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockWs {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts a mock websocket server.
pub(crate) async fn mock_ws() -> MockWs {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let url = format!("ws://127.0.0.1:{port}/ws/session");
    let (received_tx, received) = mpsc::unbounded_channel();
    let (commands, _) = broadcast::channel(16);
    let connections = Arc::new(AtomicUsize::new(0));

    let commands_c = commands.clone();
    let connections_c = connections.clone();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                continue;
            };
            connections_c.fetch_add(1, Ordering::SeqCst);
            let received_tx = received_tx.clone();
            let mut commands = commands_c.subscribe();

            tokio::spawn(async move {
                let (mut write, mut read) = ws.split();
                loop {
                    tokio::select! {
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = received_tx.send(text.as_str().to_owned());
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                        cmd = commands.recv() => match cmd {
                            Ok(WsCommand::Text(text)) => {
                                let _ = write.send(Message::Text(text.into())).await;
                            }
                            Ok(WsCommand::Close) | Err(_) => {
                                let _ = write.send(Message::Close(None)).await;
                                break;
                            }
                        },
                    }
                }
            });
        }
    });

    MockWs {
        url,
        received,
        commands,
        connections,
        handle,
    }
}

/// Records every bus event of one kind.
pub(crate) struct EventLog {
    events: Arc<Mutex<Vec<HubEvent>>>,
    _subscription: Subscription,
}

impl EventLog {
    pub fn attach(bus: &EventBus, kind: EventKind) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = bus.subscribe(kind, move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        Self {
            events,
            _subscription: subscription,
        }
    }

    pub fn events(&self) -> Vec<HubEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

/// Context with an empty active hub.
pub(crate) fn test_context(settings: FhircastConfig) -> HubContext {
    context_with_hub(HubConfig::default(), settings)
}

pub(crate) fn context_with_hub(hub: HubConfig, settings: FhircastConfig) -> HubContext {
    HubContext {
        state: HubState::new(hub),
        bus: EventBus::new(),
        http: reqwest::Client::new(),
        settings: Arc::new(settings),
    }
}

/// An enabled hub named `name` whose endpoints live on `base_url`.
pub(crate) fn hub_at(name: &str, base_url: &str) -> HubConfig {
    HubConfig {
        name: name.to_string(),
        friendly_name: format!("Hub {name}"),
        enabled: true,
        events: vec!["patient-open".into(), "patient-close".into()],
        hub_endpoint: format!("{base_url}/api/hub"),
        token_endpoint: format!("{base_url}/oauth/token"),
        client_id: "viewer".into(),
        client_secret: "s3cret".into(),
        ..HubConfig::default()
    }
}

/// Body of an accepted handshake pointing at `ws_url`.
pub(crate) fn accepted_body(ws_url: &str) -> String {
    serde_json::json!({ "hub.channel.endpoint": ws_url }).to_string()
}

/// Polls `check` until it holds or 2 s pass.
pub(crate) async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
