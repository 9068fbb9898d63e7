//! Shared utilities for transfer tests (payloads, fast engines, scripted servers).
//!
//! wiremock covers request/response pairs; the raw TCP servers here cover what
//! it cannot express: bodies cut short, bodies without a length, and bodies
//! that stall mid-stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dlkit::download::ProgressReport;
use dlkit::{
    DownloadHandle, HttpClient, RetryPolicy, TerminalEvent, TransferEngine, TransferEvent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use wiremock::{Respond, ResponseTemplate};

/// Deterministic payload of `len` bytes.
#[allow(dead_code)]
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Engine with millisecond backoff and no jitter.
#[allow(dead_code)]
pub fn fast_engine(max_attempts: u32) -> TransferEngine {
    let policy = RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        Duration::from_millis(50),
        2.0,
    )
    .with_jitter(Duration::ZERO);
    TransferEngine::new(HttpClient::new(), policy)
}

/// Everything a handle posted, in order.
#[allow(dead_code)]
#[derive(Debug)]
pub struct Collected {
    pub progress: Vec<ProgressReport>,
    pub terminal: TerminalEvent,
    /// Events received after the terminal one (must stay 0).
    pub after_terminal: usize,
    /// Terminal events received (must be exactly 1).
    pub terminal_count: usize,
}

/// Drains `handle` until its channel closes.
#[allow(dead_code)]
pub async fn collect_events(mut handle: DownloadHandle) -> Collected {
    let mut progress = Vec::new();
    let mut terminal = None;
    let mut after_terminal = 0;
    let mut terminal_count = 0;

    let drain = async {
        while let Some(event) = handle.next_event().await {
            if terminal.is_some() {
                after_terminal += 1;
            }
            match event {
                TransferEvent::Progress(report) => progress.push(report),
                TransferEvent::Terminal(done) => {
                    terminal_count += 1;
                    terminal = Some(done);
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), drain)
        .await
        .expect("transfer did not finish in time");

    Collected {
        progress,
        terminal: terminal.expect("no terminal event"),
        after_terminal,
        terminal_count,
    }
}

/// Answers with `failures` in order, then `success` for every later request.
#[allow(dead_code)]
pub struct SequenceResponder {
    pub calls: Arc<AtomicUsize>,
    pub failures: Vec<ResponseTemplate>,
    pub success: ResponseTemplate,
}

impl SequenceResponder {
    #[allow(dead_code)]
    pub fn new(failures: Vec<ResponseTemplate>, success: ResponseTemplate) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            failures,
            success,
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.failures
            .get(n)
            .cloned()
            .unwrap_or_else(|| self.success.clone())
    }
}

/// Reads one request head and returns it lowercased.
async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&head).to_ascii_lowercase()
}

/// A raw HTTP server that answers each connection with `script(index, request_head)`.
///
/// The script returns the full bytes to write; the connection is closed
/// right after, so a body shorter than its `Content-Length` is a cut-off
/// transfer and a body without one ends at close.
#[allow(dead_code)]
pub async fn scripted_server<F>(script: F) -> String
where
    F: Fn(usize, &str) -> Vec<u8> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut index = 0;
        while let Ok((mut socket, _)) = listener.accept().await {
            let head = read_request_head(&mut socket).await;
            let reply = script(index, &head);
            index += 1;
            let _ = socket.write_all(&reply).await;
            let _ = socket.flush().await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}/file")
}

/// A raw HTTP server that declares `total` bytes, sends the first `first`
/// of `body`, and sends the rest only once `release` fires (never, if it is
/// dropped).
#[allow(dead_code)]
pub async fn stalling_server(body: Vec<u8>, first: usize, release: oneshot::Receiver<()>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let _ = read_request_head(&mut socket).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body[..first]).await;
        let _ = socket.flush().await;
        if release.await.is_ok() {
            let _ = socket.write_all(&body[first..]).await;
            let _ = socket.flush().await;
        } else {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });
    format!("http://{addr}/file")
}

/// Builds a raw HTTP/1.1 response.
#[allow(dead_code)]
pub fn raw_response(status_line: &str, headers: &[(&str, String)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status_line}\r\nConnection: close\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Polls `condition` every 10 ms for up to 5 s.
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5 s");
}
